use std::cell::RefCell;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use chrono::Utc;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind, KeyModifiers};
use ratatui::layout::{Constraint, Layout, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::text::{Line, Span};
use ratatui::widgets::{Block, Borders, Clear, List, ListItem, ListState, Paragraph, Wrap};
use ratatui::{DefaultTerminal, Frame};

use crate::engine::Engine;
use crate::errors::{ClipError, Result};
use crate::export::fs::PathPicker;
use crate::export::{PermissionPrompt, PromptAnswer};
use crate::overlay::{OverlayForm, apply_suggestion, filter_suggestions, parse_tags};
use crate::protocol::{MessageSender, Response};
use crate::render::format_timestamp;
use crate::storage::models::ClippingPayload;
use crate::surface::{self, EditorParams, SurfaceStatus, folder_status_text};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Text,
    Note,
    Tags,
}

impl Field {
    fn next(self) -> Self {
        match self {
            Field::Text => Field::Note,
            Field::Note => Field::Tags,
            Field::Tags => Field::Text,
        }
    }
}

#[derive(Debug, PartialEq)]
enum Mode {
    Edit,
    PickFolder,
}

#[derive(Debug, PartialEq)]
enum Action {
    None,
    Save,
    Pick(PathBuf),
}

struct App {
    params: EditorParams,
    form: OverlayForm,
    focus: Field,
    suggestions: Vec<String>,
    dropdown: ListState,
    folder_status: String,
    path_input: String,
    mode: Mode,
    status: String,
    status_time: Option<Instant>,
    repick: bool,
    opened_at: String,
    should_quit: bool,
}

impl App {
    fn new(params: EditorParams, suggestions: Vec<String>, folder_status: String) -> Self {
        Self {
            form: OverlayForm {
                text: params.text.clone(),
                ..Default::default()
            },
            params,
            focus: Field::Text,
            suggestions,
            dropdown: ListState::default(),
            folder_status,
            path_input: String::new(),
            mode: Mode::Edit,
            status: String::new(),
            status_time: None,
            repick: false,
            opened_at: format_timestamp(&Utc::now()),
            should_quit: false,
        }
    }

    fn set_status(&mut self, msg: String) {
        self.status = msg;
        self.status_time = Some(Instant::now());
    }

    fn visible_suggestions(&self) -> Vec<&str> {
        if self.focus != Field::Tags {
            return Vec::new();
        }
        filter_suggestions(&self.suggestions, &self.form.tags)
    }

    fn focused_mut(&mut self) -> &mut String {
        match self.focus {
            Field::Text => &mut self.form.text,
            Field::Note => &mut self.form.note,
            Field::Tags => &mut self.form.tags,
        }
    }

    fn move_dropdown(&mut self, delta: isize) {
        let count = self.visible_suggestions().len();
        if count == 0 {
            self.dropdown.select(None);
            return;
        }
        let current = self.dropdown.selected().map(|i| i as isize).unwrap_or(-1);
        let next = (current + delta).clamp(0, count as isize - 1) as usize;
        self.dropdown.select(Some(next));
    }

    /// Returns true when a highlighted suggestion was applied.
    fn accept_suggestion(&mut self) -> bool {
        let Some(choice) = self
            .dropdown
            .selected()
            .and_then(|i| self.visible_suggestions().get(i).map(|s| s.to_string()))
        else {
            return false;
        };
        self.form.tags = apply_suggestion(&self.form.tags, &choice);
        self.dropdown.select(None);
        true
    }

    fn payload(&self) -> ClippingPayload {
        ClippingPayload {
            text: Some(self.form.text.trim().to_string()),
            note: Some(self.form.note.trim().to_string()),
            tags: Some(parse_tags(&self.form.tags)),
            title: Some(self.params.title.clone()),
            url: Some(self.params.url.clone()),
            date: Some(Utc::now()),
        }
    }

    fn show_response(&mut self, response: &Response) {
        let msg = match (response.ok, response.error.as_deref()) {
            (false, Some(error)) => format!("Save failed: {}", error),
            (false, None) => "Save failed".to_string(),
            (true, Some(error)) => {
                self.repick = true;
                format!("Failed to write to folder: {}. Saved to downloads instead.", error)
            }
            (true, None) if response.written_to_vault => "Saved to folder ✔".to_string(),
            (true, None) if response.written_to_downloads => "Saved to downloads".to_string(),
            (true, None) => "Saved".to_string(),
        };
        if response.ok && response.error.is_none() {
            self.should_quit = true;
        }
        self.set_status(msg);
    }

    fn show_surface_status(&mut self, status: &SurfaceStatus) {
        self.repick = status.offers_repick();
        self.set_status(status.text());
    }

    fn save(&mut self, engine: &Engine<'_>, prompt: &dyn PermissionPrompt) {
        let payload = self.payload();
        let response = engine.save_clipping(&payload, self.params.origin, Some(prompt));
        self.show_response(&response);
        self.folder_status = folder_status_text(&engine.folder_record());
    }

    fn pick_folder(&mut self, engine: &Engine<'_>, path: PathBuf) {
        let picker = PathPicker::new(path);
        let result = engine.folder_flow().and_then(|mut flow| flow.authorize(&picker));
        match result {
            Ok(Some(handle)) => {
                self.repick = false;
                self.set_status(format!("Folder chosen: {}", handle.name));
            }
            Ok(None) => self.set_status("Folder selection cancelled or failed".to_string()),
            Err(e) => {
                tracing::warn!(error = %e, "folder pick failed");
                self.set_status(format!("Folder selection cancelled or failed: {}", e));
            }
        }
        self.folder_status = folder_status_text(&engine.folder_record());
    }
}

fn expand_home(input: &str) -> PathBuf {
    match input.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|h| h.join(rest))
            .unwrap_or_else(|| PathBuf::from(input)),
        None => PathBuf::from(input),
    }
}

// ── UI rendering ───────────────────────────────────────────────────

fn field_block(title: &str, focused: bool) -> Block<'_> {
    let style = if focused {
        Style::new().fg(Color::Cyan)
    } else {
        Style::new().fg(Color::DarkGray)
    };
    Block::default()
        .borders(Borders::ALL)
        .border_style(style)
        .title(title)
}

fn draw(frame: &mut Frame, app: &mut App) {
    let [title_area, meta_area, text_area, note_area, tags_area, folder_area, help_area] =
        Layout::vertical([
            Constraint::Length(1),
            Constraint::Length(2),
            Constraint::Fill(1),
            Constraint::Length(4),
            Constraint::Length(3),
            Constraint::Length(1),
            Constraint::Length(1),
        ])
        .areas(frame.area());

    let title = if app.params.title.is_empty() {
        "Untitled"
    } else {
        app.params.title.as_str()
    };
    frame.render_widget(
        Paragraph::new(format!(" Clippings: {} ", title))
            .style(Style::new().fg(Color::Black).bg(Color::Cyan)),
        title_area,
    );

    let url = if app.params.url.is_empty() {
        "unknown"
    } else {
        app.params.url.as_str()
    };
    let meta = vec![
        Line::from(vec![
            Span::styled("Page:    ", Style::new().fg(Color::DarkGray)),
            Span::raw(url),
        ]),
        Line::from(vec![
            Span::styled("Created: ", Style::new().fg(Color::DarkGray)),
            Span::raw(app.opened_at.as_str()),
        ]),
    ];
    frame.render_widget(Paragraph::new(meta), meta_area);

    let cursor = |field: Field| if app.focus == field { "_" } else { "" };
    frame.render_widget(
        Paragraph::new(format!("{}{}", app.form.text, cursor(Field::Text)))
            .block(field_block("Selection", app.focus == Field::Text))
            .wrap(Wrap { trim: false }),
        text_area,
    );
    frame.render_widget(
        Paragraph::new(format!("{}{}", app.form.note, cursor(Field::Note)))
            .block(field_block("Note", app.focus == Field::Note))
            .wrap(Wrap { trim: false }),
        note_area,
    );
    frame.render_widget(
        Paragraph::new(format!("{}{}", app.form.tags, cursor(Field::Tags)))
            .block(field_block("Tags (comma separated)", app.focus == Field::Tags)),
        tags_area,
    );

    // Tag dropdown floats over the fields above the tags input
    let matches: Vec<ListItem> = app
        .visible_suggestions()
        .into_iter()
        .map(|s| ListItem::new(s.to_string()))
        .collect();
    if !matches.is_empty() {
        let height = (matches.len() as u16 + 2).min(8);
        let area = Rect {
            x: tags_area.x + 2,
            y: tags_area.y.saturating_sub(height),
            width: tags_area.width.saturating_sub(4).min(40),
            height,
        };
        let list = List::new(matches)
            .block(Block::default().borders(Borders::ALL).title("Suggestions"))
            .highlight_style(
                Style::new()
                    .fg(Color::Black)
                    .bg(Color::Cyan)
                    .add_modifier(Modifier::BOLD),
            )
            .highlight_symbol("▸ ");
        frame.render_widget(Clear, area);
        frame.render_stateful_widget(list, area, &mut app.dropdown);
    }

    let folder_line = if app.mode == Mode::PickFolder {
        format!(" Folder path: {}_", app.path_input)
    } else {
        format!(" {}", app.folder_status)
    };
    frame.render_widget(
        Paragraph::new(folder_line).style(Style::new().fg(Color::Yellow)),
        folder_area,
    );

    if let Some(t) = app.status_time
        && t.elapsed() > Duration::from_secs(5)
        && !app.repick
    {
        app.status.clear();
        app.status_time = None;
    }

    let help_text = match app.mode {
        Mode::PickFolder => " Type a folder path · [Enter] choose · [Esc] cancel".to_string(),
        Mode::Edit if app.repick => format!(" {} · [Ctrl-P] re-pick folder", app.status),
        Mode::Edit if !app.status.is_empty() => format!(" {} ", app.status),
        Mode::Edit => {
            " [Tab] next field [↑/↓] suggestions [Ctrl-S] save [Ctrl-P] choose folder [Esc] cancel"
                .to_string()
        }
    };
    frame.render_widget(
        Paragraph::new(help_text).style(Style::new().fg(Color::Black).bg(Color::White)),
        help_area,
    );
}

fn draw_prompt(frame: &mut Frame, folder_name: &str) {
    let [_, body, _] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(5),
        Constraint::Fill(1),
    ])
    .areas(frame.area());
    let lines = vec![
        Line::raw("Clippings needs permission to write into the chosen folder."),
        Line::from(vec![
            Span::styled("Folder: ", Style::new().fg(Color::DarkGray)),
            Span::raw(folder_name),
        ]),
        Line::raw(""),
        Line::raw("[y] Grant write permission   [n] Cancel"),
    ];
    frame.render_widget(Clear, body);
    frame.render_widget(
        Paragraph::new(lines).block(Block::default().borders(Borders::ALL).title("Permission")),
        body,
    );
}

// ── Event handling ─────────────────────────────────────────────────

fn handle_key(app: &mut App, key: KeyEvent) -> Action {
    let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
    match app.mode {
        Mode::Edit => match key.code {
            KeyCode::Esc => app.should_quit = true,
            KeyCode::Char('s') if ctrl => return Action::Save,
            KeyCode::Char('p') if ctrl => {
                app.mode = Mode::PickFolder;
                app.path_input.clear();
            }
            KeyCode::Tab => {
                app.focus = app.focus.next();
                app.dropdown.select(None);
            }
            KeyCode::Down => app.move_dropdown(1),
            KeyCode::Up => app.move_dropdown(-1),
            KeyCode::Enter => {
                if !app.accept_suggestion() && app.focus != Field::Tags {
                    app.focused_mut().push('\n');
                }
            }
            KeyCode::Backspace => {
                app.focused_mut().pop();
                app.dropdown.select(None);
            }
            KeyCode::Char(c) if !ctrl => {
                app.focused_mut().push(c);
                app.dropdown.select(None);
            }
            _ => {}
        },
        Mode::PickFolder => match key.code {
            KeyCode::Esc => {
                app.mode = Mode::Edit;
                app.set_status("Folder selection cancelled or failed".to_string());
            }
            KeyCode::Enter => {
                app.mode = Mode::Edit;
                let input = app.path_input.trim().to_string();
                if input.is_empty() {
                    app.set_status("Folder selection cancelled or failed".to_string());
                } else {
                    return Action::Pick(expand_home(&input));
                }
            }
            KeyCode::Backspace => {
                app.path_input.pop();
            }
            KeyCode::Char(c) => app.path_input.push(c),
            _ => {}
        },
    }
    Action::None
}

/// Blocks on a y/n answer drawn over the editor. Terminal errors count as
/// a dismissal.
struct TuiPrompt<'t> {
    terminal: &'t RefCell<DefaultTerminal>,
}

impl TuiPrompt<'_> {
    fn ask(&self, folder_name: &str) -> std::io::Result<PromptAnswer> {
        let mut terminal = self.terminal.borrow_mut();
        loop {
            terminal.draw(|frame| draw_prompt(frame, folder_name))?;
            let Event::Key(key) = event::read()? else {
                continue;
            };
            if key.kind != KeyEventKind::Press {
                continue;
            }
            match key.code {
                KeyCode::Char('y') | KeyCode::Enter => return Ok(PromptAnswer::Grant),
                KeyCode::Char('n') | KeyCode::Esc => return Ok(PromptAnswer::Cancel),
                _ => {}
            }
        }
    }
}

impl PermissionPrompt for TuiPrompt<'_> {
    fn confirm(&self, folder_name: &str) -> PromptAnswer {
        self.ask(folder_name).unwrap_or_else(|e| {
            tracing::warn!(error = %e, "permission prompt failed");
            PromptAnswer::Cancel
        })
    }
}

fn next_key() -> std::io::Result<Option<KeyEvent>> {
    if !event::poll(Duration::from_millis(250))? {
        return Ok(None);
    }
    match event::read()? {
        Event::Key(key) if key.kind == KeyEventKind::Press => Ok(Some(key)),
        _ => Ok(None),
    }
}

// ── Entry point ────────────────────────────────────────────────────

/// Runs the standalone editor. Returns the last status line so the caller
/// can echo it once the terminal is restored.
pub fn run(
    engine: &Engine<'_>,
    coordinator: &dyn MessageSender,
    params: EditorParams,
) -> Result<Option<String>> {
    let suggestions = engine.tag_suggestions()?;
    let folder_status = folder_status_text(&engine.folder_record());
    let auto_write = params.auto_write;
    let mut app = App::new(params, suggestions, folder_status);

    let terminal = RefCell::new(ratatui::init());
    let prompt = TuiPrompt {
        terminal: &terminal,
    };

    let result = (|| {
        if auto_write {
            let status = surface::auto_write(engine, app.params.origin, &prompt, coordinator)
                .map_err(|e| std::io::Error::other(e.to_string()))?;
            app.show_surface_status(&status);
            app.folder_status = folder_status_text(&engine.folder_record());
        }
        loop {
            terminal.borrow_mut().draw(|frame| draw(frame, &mut app))?;
            if let Some(key) = next_key()? {
                match handle_key(&mut app, key) {
                    Action::Save => app.save(engine, &prompt),
                    Action::Pick(path) => app.pick_folder(engine, path),
                    Action::None => {}
                }
            }
            if app.should_quit {
                break;
            }
        }
        Ok::<(), std::io::Error>(())
    })();

    ratatui::restore();

    result.map_err(|e| ClipError::Terminal(e.to_string()))?;
    Ok(Some(app.status).filter(|s| !s.is_empty()))
}
