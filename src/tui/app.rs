use anyhow::Result;
use hej::service::{ListSort, NoteService, SortDirection, SortField};
use hej::storage::NoteMeta;
use ratatui::prelude::*;
use ratatui::widgets::*;
use std::time::Duration;

const LATEST_LIMIT: usize = 20;
const SPINNER: [&str; 4] = ["·  ", "·· ", "···", " ··"];
const SAVE_FAILED: &str = "✗ Save failed";
const CLOSE_FLUSH_TIMEOUT: Duration = Duration::from_secs(5);

pub enum AppMode {
    List,
    Edit,
    DeleteConfirm,
    Help,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListTab {
    All,
    Favorites,
    Latest,
}

impl ListTab {
    fn next(self) -> Self {
        match self {
            ListTab::All => ListTab::Favorites,
            ListTab::Favorites => ListTab::Latest,
            ListTab::Latest => ListTab::All,
        }
    }

    fn label(self) -> &'static str {
        match self {
            ListTab::All => "All",
            ListTab::Favorites => "Favorites",
            ListTab::Latest => "Latest",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditField {
    Title,
    Text,
}

pub struct App {
    pub service: NoteService,
    pub tab: ListTab,
    pub sort: ListSort,
    pub selected_index: usize,
    pub mode: AppMode,
    pub focus: EditField,
    pub pending_delete: Option<NoteMeta>,
    pub should_quit: bool,
    pub status_message: Option<String>,
    spinner: usize,
}

impl App {
    pub fn new(service: NoteService) -> Self {
        App {
            service,
            tab: ListTab::All,
            sort: ListSort::default(),
            selected_index: 0,
            mode: AppMode::List,
            focus: EditField::Title,
            pending_delete: None,
            should_quit: false,
            status_message: None,
            spinner: 0,
        }
    }

    /// Periodic work between key events: editor progress and list refetch
    pub async fn tick(&mut self) {
        self.spinner = self.spinner.wrapping_add(1);

        self.service.poll();
        match self.service.editor().and_then(|e| e.last_error()) {
            Some(err) => {
                self.status_message = Some(format!("{}: {} (Ctrl+R to retry)", SAVE_FAILED, err));
            }
            None if self.status_message.as_deref().is_some_and(|m| m.starts_with(SAVE_FAILED)) => {
                self.status_message = Some("✓ Saved".to_string());
            }
            None => {}
        }

        if matches!(self.mode, AppMode::List) && self.service.is_logged_in() {
            if let Err(e) = self.service.refresh_if_stale().await {
                self.status_message = Some(format!("✗ Failed to load notes: {}", e));
            }
        }
    }

    /// Flush the open note before the process exits
    pub async fn shutdown(&mut self) {
        self.close_editor().await;
    }

    pub fn visible_notes(&self) -> Vec<NoteMeta> {
        match self.tab {
            ListTab::All => self.service.all(self.sort),
            ListTab::Favorites => self.service.favorites(),
            ListTab::Latest => self.service.latest(LATEST_LIMIT),
        }
    }

    fn selected_note(&self) -> Option<NoteMeta> {
        self.visible_notes().into_iter().nth(self.selected_index)
    }

    pub async fn handle_key(&mut self, key: crossterm::event::KeyCode, modifiers: crossterm::event::KeyModifiers) -> Result<()> {
        match self.mode {
            AppMode::List => self.handle_list_key(key).await?,
            AppMode::Edit => self.handle_edit_key(key, modifiers).await?,
            AppMode::DeleteConfirm => self.handle_delete_confirm_key(key).await?,
            AppMode::Help => self.handle_help_key(key)?,
        }
        Ok(())
    }

    async fn handle_list_key(&mut self, key: crossterm::event::KeyCode) -> Result<()> {
        match key {
            crossterm::event::KeyCode::Esc | crossterm::event::KeyCode::Char('q') => {
                self.should_quit = true;
            }
            crossterm::event::KeyCode::Char('j') | crossterm::event::KeyCode::Down => {
                let max_index = self.visible_notes().len().saturating_sub(1);
                if self.selected_index < max_index {
                    self.selected_index += 1;
                }
            }
            crossterm::event::KeyCode::Char('k') | crossterm::event::KeyCode::Up => {
                if self.selected_index > 0 {
                    self.selected_index -= 1;
                }
            }
            crossterm::event::KeyCode::Tab => {
                self.tab = self.tab.next();
                self.selected_index = 0;
            }
            crossterm::event::KeyCode::Char('1') => self.sort.toggle(SortField::Title),
            crossterm::event::KeyCode::Char('2') => self.sort.toggle(SortField::Created),
            crossterm::event::KeyCode::Char('3') => self.sort.toggle(SortField::Modified),
            crossterm::event::KeyCode::Char('n') => {
                match self.service.create_note().await {
                    Ok(note) => {
                        self.service.open_editor(&note.uuid);
                        self.focus = EditField::Title;
                        self.mode = AppMode::Edit;
                        self.status_message = None;
                    }
                    Err(e) => {
                        self.status_message = Some(format!("✗ Failed to create note: {}", e));
                    }
                }
            }
            crossterm::event::KeyCode::Enter => {
                if let Some(note) = self.selected_note() {
                    if self.service.open_editor(&note.uuid) {
                        self.focus = EditField::Title;
                        self.mode = AppMode::Edit;
                        self.status_message = None;
                    }
                }
            }
            crossterm::event::KeyCode::Char('f') => {
                if let Some(note) = self.selected_note() {
                    match self.service.set_favorite(&note.uuid, !note.favorite).await {
                        Ok(()) if note.favorite => {
                            self.status_message = Some(format!("✓ Removed from favorites: {}", note.display_title()));
                        }
                        Ok(()) => {
                            self.status_message = Some(format!("✓ Added to favorites: {}", note.display_title()));
                        }
                        Err(e) => {
                            self.status_message = Some(format!("✗ Failed to update favorite: {}", e));
                        }
                    }
                }
            }
            crossterm::event::KeyCode::Char('d') => {
                if let Some(note) = self.selected_note() {
                    self.pending_delete = Some(note);
                    self.mode = AppMode::DeleteConfirm;
                }
            }
            crossterm::event::KeyCode::Char('r') => {
                match self.service.refresh().await {
                    Ok(()) => self.status_message = Some("✓ Notes refreshed".to_string()),
                    Err(e) => self.status_message = Some(format!("✗ Refresh failed: {}", e)),
                }
                self.clamp_selection();
            }
            crossterm::event::KeyCode::Char('?') => {
                self.mode = AppMode::Help;
            }
            _ => {}
        }
        Ok(())
    }

    async fn handle_edit_key(&mut self, key: crossterm::event::KeyCode, modifiers: crossterm::event::KeyModifiers) -> Result<()> {
        let Some(editor) = self.service.editor() else {
            self.mode = AppMode::List;
            return Ok(());
        };
        let mut title = editor.title().to_string();
        let mut text = editor.text().to_string();

        match key {
            crossterm::event::KeyCode::Esc => {
                self.close_editor().await;
                self.mode = AppMode::List;
                self.clamp_selection();
            }
            crossterm::event::KeyCode::Char('s') if modifiers.contains(crossterm::event::KeyModifiers::CONTROL) => {
                self.service.save_now();
            }
            crossterm::event::KeyCode::Char('r') if modifiers.contains(crossterm::event::KeyModifiers::CONTROL) => {
                self.service.retry_save();
                self.status_message = Some("ℹ Retrying save".to_string());
            }
            crossterm::event::KeyCode::Tab => {
                self.focus = match self.focus {
                    EditField::Title => EditField::Text,
                    EditField::Text => EditField::Title,
                };
            }
            crossterm::event::KeyCode::Enter => match self.focus {
                EditField::Title => self.focus = EditField::Text,
                EditField::Text => {
                    text.push('\n');
                    self.service.update_text(text);
                }
            },
            crossterm::event::KeyCode::Char(c) => match self.focus {
                EditField::Title => {
                    title.push(c);
                    self.service.update_title(title);
                }
                EditField::Text => {
                    text.push(c);
                    self.service.update_text(text);
                }
            },
            crossterm::event::KeyCode::Backspace => match self.focus {
                EditField::Title => {
                    title.pop();
                    self.service.update_title(title);
                }
                EditField::Text => {
                    text.pop();
                    self.service.update_text(text);
                }
            },
            _ => {}
        }
        Ok(())
    }

    async fn handle_delete_confirm_key(&mut self, key: crossterm::event::KeyCode) -> Result<()> {
        match key {
            crossterm::event::KeyCode::Char('y') | crossterm::event::KeyCode::Enter => {
                if let Some(note) = self.pending_delete.take() {
                    self.status_message = Some(match self.service.delete_note(&note.uuid).await {
                        Ok(true) => format!("✓ Deleted: {}", note.display_title()),
                        Ok(false) => "✗ Note no longer exists".to_string(),
                        Err(e) => format!("✗ Delete failed: {}", e),
                    });
                }
                self.clamp_selection();
                self.mode = AppMode::List;
            }
            crossterm::event::KeyCode::Esc | crossterm::event::KeyCode::Char('n') => {
                self.pending_delete = None;
                self.mode = AppMode::List;
            }
            _ => {}
        }
        Ok(())
    }

    fn handle_help_key(&mut self, key: crossterm::event::KeyCode) -> Result<()> {
        match key {
            crossterm::event::KeyCode::Esc | crossterm::event::KeyCode::Char('?') | crossterm::event::KeyCode::Char('q') => {
                self.mode = AppMode::List;
            }
            _ => {}
        }
        Ok(())
    }

    /// Send unsent edits, give them a moment to land, then close the editor
    async fn close_editor(&mut self) {
        if self.service.editor().is_none() {
            return;
        }
        self.service.save_now();
        if tokio::time::timeout(CLOSE_FLUSH_TIMEOUT, self.service.settle()).await.is_err() {
            tracing::warn!("closing editor with writes still in flight");
        }
        if let Some(err) = self.service.editor().and_then(|e| e.last_error()) {
            self.status_message = Some(format!("✗ Last save failed: {}", err));
        }
        self.service.close_editor();
    }

    fn clamp_selection(&mut self) {
        let len = self.visible_notes().len();
        if self.selected_index >= len {
            self.selected_index = len.saturating_sub(1);
        }
    }

    pub fn render(&self, frame: &mut Frame) {
        match self.mode {
            AppMode::List => self.render_list(frame),
            AppMode::Edit => self.render_edit(frame),
            AppMode::DeleteConfirm => self.render_delete_confirm(frame),
            AppMode::Help => self.render_help(frame),
        }
    }

    fn layout(frame: &Frame) -> std::rc::Rc<[Rect]> {
        Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3), Constraint::Length(3)])
            .split(frame.area())
    }

    fn render_title_bar(&self, frame: &mut Frame, area: Rect) {
        let session = if self.service.is_logged_in() { "" } else { "  (not logged in)" };
        let tabs = Tabs::new([ListTab::All, ListTab::Favorites, ListTab::Latest].map(ListTab::label))
            .select(match self.tab {
                ListTab::All => 0,
                ListTab::Favorites => 1,
                ListTab::Latest => 2,
            })
            .block(Block::default().borders(Borders::ALL).title(format!("hej{}", session)))
            .style(Style::default().fg(Color::Cyan))
            .highlight_style(Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD));
        frame.render_widget(tabs, area);
    }

    fn render_status(&self, frame: &mut Frame, area: Rect) {
        let message = self.status_message.as_deref().unwrap_or("");
        let color = if message.starts_with('✓') {
            Color::Green
        } else if message.starts_with('✗') {
            Color::Red
        } else {
            Color::Yellow
        };
        let status = Paragraph::new(message)
            .block(Block::default().borders(Borders::ALL).title("Status"))
            .style(Style::default().fg(color));
        frame.render_widget(status, area);
    }

    fn render_help_bar(frame: &mut Frame, area: Rect, text: &str) {
        let help = Paragraph::new(text)
            .block(Block::default().borders(Borders::ALL).title("Help"))
            .style(Style::default().fg(Color::DarkGray));
        frame.render_widget(help, area);
    }

    fn render_list(&self, frame: &mut Frame) {
        let chunks = Self::layout(frame);
        self.render_title_bar(frame, chunks[0]);

        let notes = self.visible_notes();
        let items: Vec<ListItem> = notes
            .iter()
            .enumerate()
            .map(|(i, note)| {
                let is_selected = i == self.selected_index;
                let star = if note.favorite { "★ " } else { "  " };
                let title_style = if is_selected {
                    Style::default().fg(Color::White).add_modifier(Modifier::BOLD)
                } else {
                    Style::default().fg(Color::White)
                };
                ListItem::new(Line::from(vec![
                    Span::styled(star, Style::default().fg(Color::Yellow)),
                    Span::styled(format!("{:<40}", note.display_title()), title_style),
                    Span::styled(format!(" {}", note.creation_date.format("%Y-%m-%d")), Style::default().fg(Color::DarkGray)),
                    Span::styled(format!("  {}", note.last_changed.format("%Y-%m-%d %H:%M")), Style::default().fg(Color::DarkGray)),
                ]))
            })
            .collect();

        let mut state = ListState::default();
        state.select(Some(self.selected_index));

        let list_title = match self.tab {
            ListTab::All => format!("Notes ({}, sorted by {})", notes.len(), sort_label(self.sort)),
            ListTab::Favorites => format!("Favorites ({})", notes.len()),
            ListTab::Latest => format!("Latest ({})", notes.len()),
        };
        let list = List::new(items)
            .block(Block::default().borders(Borders::ALL).title(list_title))
            .highlight_style(Style::default().fg(Color::Yellow).bg(Color::DarkGray))
            .highlight_symbol("▶ ");
        frame.render_stateful_widget(list, chunks[1], &mut state);

        self.render_status(frame, chunks[2]);
        Self::render_help_bar(frame, chunks[3], "j/k: navigate | Enter: edit | n: new | f: favorite | d: delete | Tab: switch list | 1/2/3: sort | r: refresh | ?: help | q: quit");
    }

    fn render_edit(&self, frame: &mut Frame) {
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Length(3), Constraint::Min(0), Constraint::Length(3), Constraint::Length(3)])
            .split(frame.area());

        let Some(editor) = self.service.editor() else {
            return;
        };

        let indicator = if editor.updating() {
            SPINNER[self.spinner % SPINNER.len()]
        } else if editor.last_error().is_some() {
            " ✗ "
        } else {
            "   "
        };
        let focused = Style::default().fg(Color::Yellow);
        let unfocused = Style::default().fg(Color::DarkGray);

        let title = Paragraph::new(editor.title())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(format!("Title {}", indicator))
                    .border_style(if self.focus == EditField::Title { focused } else { unfocused }),
            )
            .style(Style::default().fg(Color::White).add_modifier(Modifier::BOLD));
        frame.render_widget(title, chunks[0]);

        let meta = self
            .service
            .get(editor.uuid())
            .map(|n| format!("Text (changed {})", n.last_changed.format("%Y-%m-%d %H:%M:%S")))
            .unwrap_or_else(|| "Text".to_string());
        let text = Paragraph::new(editor.text())
            .block(
                Block::default()
                    .borders(Borders::ALL)
                    .title(meta)
                    .border_style(if self.focus == EditField::Text { focused } else { unfocused }),
            )
            .wrap(Wrap { trim: false })
            .style(Style::default().fg(Color::White));
        frame.render_widget(text, chunks[1]);

        self.render_status(frame, chunks[2]);
        Self::render_help_bar(frame, chunks[3], "Tab: switch field | Ctrl+S: save now | Ctrl+R: retry save | Esc: close");
    }

    fn render_delete_confirm(&self, frame: &mut Frame) {
        let chunks = Self::layout(frame);
        self.render_title_bar(frame, chunks[0]);

        let message = match &self.pending_delete {
            Some(note) => format!("Delete note: {}?\n\nPress Enter/y to confirm, Esc/n to cancel", note.display_title()),
            None => "Delete note?".to_string(),
        };
        let confirm = Paragraph::new(message)
            .block(Block::default().borders(Borders::ALL).title("Confirm Delete"))
            .wrap(Wrap { trim: true })
            .style(Style::default().fg(Color::Red));
        frame.render_widget(confirm, chunks[1]);

        self.render_status(frame, chunks[2]);
        Self::render_help_bar(frame, chunks[3], "Enter/y: confirm | Esc/n: cancel");
    }

    fn render_help(&self, frame: &mut Frame) {
        let chunks = Self::layout(frame);
        self.render_title_bar(frame, chunks[0]);

        let lines = vec![
            Line::from(Span::styled("Notes list", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
            Line::from("  j/k, ↑/↓     move selection"),
            Line::from("  Enter        edit selected note"),
            Line::from("  n            new note"),
            Line::from("  f            toggle favorite"),
            Line::from("  d            delete note"),
            Line::from("  Tab          All / Favorites / Latest"),
            Line::from("  1 / 2 / 3    sort by title / created / modified (again to reverse)"),
            Line::from("  r            reload from server"),
            Line::default(),
            Line::from(Span::styled("Editor", Style::default().fg(Color::Cyan).add_modifier(Modifier::BOLD))),
            Line::from("  typing       saved automatically after a short pause"),
            Line::from("  Tab          switch between title and text"),
            Line::from("  Ctrl+S       save now"),
            Line::from("  Ctrl+R       retry a failed save"),
            Line::from("  Esc          save and close"),
        ];
        let help = Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Help"));
        frame.render_widget(help, chunks[1]);

        self.render_status(frame, chunks[2]);
        Self::render_help_bar(frame, chunks[3], "Esc/?: back");
    }
}

fn sort_label(sort: ListSort) -> String {
    let field = match sort.field {
        SortField::Title => "title",
        SortField::Created => "created",
        SortField::Modified => "modified",
    };
    let arrow = match sort.direction {
        SortDirection::Asc => "↑",
        SortDirection::Desc => "↓",
    };
    format!("{} {}", field, arrow)
}
