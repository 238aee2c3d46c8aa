use anyhow::Result;
use clap::Parser;
use config::{load_env_file, ApiKey, ModelProfile, Settings};
use crossterm::{
    event::{
        self, DisableMouseCapture, EnableMouseCapture, Event, KeyCode, KeyEventKind, KeyModifiers,
        MouseEventKind,
    },
    execute,
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
};
use groundchat_core::view::SOURCES_HEADING;
use groundchat_core::{
    turn_views, ChatEngine, Citation, EngineEvent, Mode, Session, Transcript, TurnView,
};
use llm::{GeminiProvider, Role, DEFAULT_BASE_URL};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState},
    Frame, Terminal,
};
use std::collections::{HashSet, VecDeque};
use std::io;
use std::sync::Arc;

#[cfg(not(debug_assertions))]
use tracing_appender::rolling::{Builder, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use tui_input::backend::crossterm::EventHandler;
use tui_input::Input;
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

const INPUT_PLACEHOLDER: &str = "best coffee in India";

/// Rows of an expanded sources panel visible at once.
const SOURCES_ROWS: usize = 8;

#[derive(Parser, Debug)]
#[command(name = "groundchat", about = "Chat with Gemini, grounded in Google Search")]
struct Args {
    /// Model profile to start with (fast, accurate)
    #[arg(short, long)]
    model: Option<ModelProfile>,

    /// Wait for complete answers instead of streaming them
    #[arg(long)]
    no_stream: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum SlashCommand {
    Help,
    /// `None` toggles between the two profiles.
    Model(Option<ModelProfile>),
    Quit,
}

fn parse_command(input: &str) -> Result<SlashCommand, String> {
    let mut parts = input.trim_start_matches('/').split_whitespace();
    match parts.next().unwrap_or("") {
        "help" => Ok(SlashCommand::Help),
        "quit" | "exit" => Ok(SlashCommand::Quit),
        "model" => match parts.next() {
            Some(name) => name.parse().map(|p| SlashCommand::Model(Some(p))),
            None => Ok(SlashCommand::Model(None)),
        },
        other => Err(format!("Unknown command: /{}. Try /help", other)),
    }
}

/// Prompts kept for recall with the arrow keys.
const HISTORY_LIMIT: usize = 100;

/// Where the user is while paging through earlier prompts.
enum Recall {
    Editing,
    /// `index` counts back from the newest prompt; `draft` is the unsent text.
    Browsing { index: usize, draft: String },
}

/// Sent prompts and commands, newest last.
struct PromptHistory {
    prompts: VecDeque<String>,
    recall: Recall,
}

impl PromptHistory {
    fn new() -> Self {
        Self {
            prompts: VecDeque::new(),
            recall: Recall::Editing,
        }
    }

    /// Remember `prompt` unless it repeats the newest one.
    fn record(&mut self, prompt: String) {
        self.recall = Recall::Editing;
        if prompt.is_empty() || self.prompts.back() == Some(&prompt) {
            return;
        }
        if self.prompts.len() == HISTORY_LIMIT {
            self.prompts.pop_front();
        }
        self.prompts.push_back(prompt);
    }

    fn nth_newest(&self, index: usize) -> Option<&str> {
        let pos = self.prompts.len().checked_sub(index + 1)?;
        self.prompts.get(pos).map(String::as_str)
    }

    /// One prompt further back. `typed` is kept as the draft on the first step.
    fn older(&mut self, typed: &str) -> Option<&str> {
        let index = match &self.recall {
            Recall::Editing if !self.prompts.is_empty() => 0,
            Recall::Browsing { index, .. } if index + 1 < self.prompts.len() => index + 1,
            _ => return None,
        };
        let draft = match std::mem::replace(&mut self.recall, Recall::Editing) {
            Recall::Browsing { draft, .. } => draft,
            Recall::Editing => typed.to_string(),
        };
        self.recall = Recall::Browsing { index, draft };
        self.nth_newest(index)
    }

    /// One prompt forward; past the newest, the draft comes back.
    fn newer(&mut self) -> Option<String> {
        match std::mem::replace(&mut self.recall, Recall::Editing) {
            Recall::Editing => None,
            Recall::Browsing { index: 0, draft } => Some(draft),
            Recall::Browsing { index, draft } => {
                let prompt = self.nth_newest(index - 1).map(str::to_string);
                self.recall = Recall::Browsing {
                    index: index - 1,
                    draft,
                };
                prompt
            }
        }
    }

    /// Typing ends browsing and keeps what is in the input.
    fn stop_browsing(&mut self) {
        self.recall = Recall::Editing;
    }
}

/// The part of `citations` shown in a panel scrolled to `offset`.
fn visible_sources(citations: &[Citation], offset: usize) -> (usize, &[Citation]) {
    let start = offset.min(citations.len().saturating_sub(SOURCES_ROWS));
    let end = (start + SOURCES_ROWS).min(citations.len());
    (start, &citations[start..end])
}

/// Byte index of the first char of `text` that would pass `width` columns.
/// Always keeps at least one char.
fn split_at_width(text: &str, width: usize) -> usize {
    let mut used = 0;
    for (idx, ch) in text.char_indices() {
        let w = ch.width().unwrap_or(0);
        if idx > 0 && used + w > width {
            return idx;
        }
        used += w;
    }
    text.len()
}

/// Break `line` into rows of at most `width` columns, at spaces where
/// possible. Span styles carry over to every row.
fn wrap_line(line: Line<'static>, width: usize) -> Vec<Line<'static>> {
    if width == 0 || line.width() <= width {
        return vec![line];
    }

    let mut rows: Vec<Vec<Span<'static>>> = Vec::new();
    let mut row: Vec<Span<'static>> = Vec::new();
    let mut row_width = 0;
    for span in &line.spans {
        for word in span.content.split_inclusive(' ') {
            let mut rest = word;
            while !rest.is_empty() {
                let fitted = rest.trim_end();
                if row_width + rest.width() <= width {
                    row.push(Span::styled(rest.to_string(), span.style));
                    row_width += rest.width();
                    break;
                }
                if row_width + fitted.width() <= width {
                    // Spaces at a break are dropped.
                    row.push(Span::styled(fitted.to_string(), span.style));
                    rows.push(std::mem::take(&mut row));
                    row_width = 0;
                    break;
                }
                if row_width > 0 {
                    rows.push(std::mem::take(&mut row));
                    row_width = 0;
                    continue;
                }
                // Single word wider than the row.
                let split = split_at_width(rest, width);
                row.push(Span::styled(rest[..split].to_string(), span.style));
                rows.push(std::mem::take(&mut row));
                rest = &rest[split..];
            }
        }
    }
    if !row.is_empty() {
        rows.push(row);
    }
    rows.into_iter()
        .map(|spans| Line::from(spans).style(line.style))
        .collect()
}

/// Indices of turns that carry a sources panel.
fn cited_turns(views: &[TurnView<'_>]) -> Vec<usize> {
    views.iter().filter(|v| v.has_sources()).map(|v| v.index).collect()
}

struct App {
    input: Input,
    engine: ChatEngine,
    history: PromptHistory,
    /// Last transcript snapshot taken while the session was free.
    transcript: Transcript,
    status_message: Option<String>,
    last_error: Option<String>,
    is_streaming: bool,
    thinking_frame: usize,
    current_response: String,
    scroll_offset: usize,
    selected_turn: Option<usize>,
    expanded: HashSet<usize>,
    sources_offset: usize,
}

impl App {
    fn new(engine: ChatEngine) -> Self {
        App {
            input: Input::default(),
            engine,
            history: PromptHistory::new(),
            transcript: Transcript::with_welcome(),
            status_message: None,
            last_error: None,
            is_streaming: false,
            thinking_frame: 0,
            current_response: String::new(),
            scroll_offset: 0,
            selected_turn: None,
            expanded: HashSet::new(),
            sources_offset: 0,
        }
    }

    fn refresh_transcript(&mut self) {
        let session = self.engine.session();
        if let Ok(session) = session.try_lock() {
            if session.transcript().len() != self.transcript.len() {
                self.transcript = session.transcript().clone();
            }
        }
    }

    fn handle_command(&mut self, input: &str) -> bool {
        match parse_command(input) {
            Ok(SlashCommand::Help) => {
                self.status_message = Some(
                    concat!(
                        "/model [fast|accurate] • /quit • Esc cancel • F2 model • ",
                        "Ctrl+S sources • Ctrl+↑/↓ select"
                    )
                    .to_string(),
                );
                true
            }
            Ok(SlashCommand::Model(profile)) => {
                let profile = profile.unwrap_or_else(|| self.engine.profile().toggle());
                self.switch_profile(profile);
                true
            }
            Ok(SlashCommand::Quit) => false,
            Err(e) => {
                self.status_message = Some(e);
                true
            }
        }
    }

    fn switch_profile(&mut self, profile: ModelProfile) {
        self.engine.set_profile(profile);
        self.status_message = Some(format!("Switching to {}", profile));
    }

    fn queue_message(&mut self, message: String) {
        self.is_streaming = true;
        self.thinking_frame = 0;
        self.current_response.clear();
        self.last_error = None;
        self.scroll_offset = 0;
        self.engine.submit(message);
    }

    fn scroll_up(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_add(lines);
    }

    fn scroll_down(&mut self, lines: usize) {
        self.scroll_offset = self.scroll_offset.saturating_sub(lines);
    }

    /// Move the selection to the previous (`back`) or next turn with sources.
    fn select_cited_turn(&mut self, back: bool) {
        let cited = cited_turns(&turn_views(&self.transcript));
        if cited.is_empty() {
            return;
        }
        let position = self.selected_turn.and_then(|s| cited.iter().position(|&i| i == s));
        let next = match (position, back) {
            (None, _) => cited.len() - 1,
            (Some(p), true) => p.saturating_sub(1),
            (Some(p), false) => (p + 1).min(cited.len() - 1),
        };
        self.selected_turn = Some(cited[next]);
        self.sources_offset = 0;
    }

    fn toggle_sources(&mut self) {
        if self.selected_turn.is_none() {
            self.select_cited_turn(true);
        }
        if let Some(turn) = self.selected_turn {
            if !self.expanded.remove(&turn) {
                self.expanded.insert(turn);
            }
            self.sources_offset = 0;
        }
    }

    fn scroll_sources(&mut self, down: bool) {
        let Some(turn) = self.selected_turn.filter(|t| self.expanded.contains(t)) else {
            return;
        };
        let total = self
            .transcript
            .turns()
            .get(turn)
            .map(|t| t.citations.len())
            .unwrap_or(0);
        let max_offset = total.saturating_sub(SOURCES_ROWS);
        self.sources_offset = if down {
            (self.sources_offset + SOURCES_ROWS).min(max_offset)
        } else {
            self.sources_offset.saturating_sub(SOURCES_ROWS)
        };
    }

    fn get_thinking_indicator(&self) -> &'static str {
        const BRAILLE_FRAMES: [&str; 8] = ["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧"];
        BRAILLE_FRAMES[self.thinking_frame % BRAILLE_FRAMES.len()]
    }

    fn advance_thinking_animation(&mut self) {
        self.thinking_frame = self.thinking_frame.wrapping_add(1);
    }

    fn check_engine_events(&mut self) {
        while let Some(event) = self.engine.try_recv() {
            match event {
                EngineEvent::Partial(markdown) => {
                    self.current_response = markdown;
                }
                EngineEvent::TurnComplete => {
                    self.is_streaming = false;
                    self.current_response.clear();
                }
                EngineEvent::Error(err) => {
                    tracing::warn!("TUI: interaction failed: {}", err);
                    self.is_streaming = false;
                    self.last_error = Some(err);
                    self.current_response.clear();
                }
                EngineEvent::Cancelled => {
                    self.is_streaming = false;
                    self.status_message = Some("Cancelled".to_string());
                    self.current_response.clear();
                }
                EngineEvent::ProfileChanged(profile) => {
                    self.status_message = Some(format!("Now using {}", profile));
                }
            }
        }
    }

    /// Handle a key event - returns false if should quit
    fn handle_key_event(&mut self, key: crossterm::event::KeyEvent) -> bool {
        if key.kind != KeyEventKind::Press {
            return true;
        }

        match (key.code, key.modifiers) {
            (KeyCode::Char('c') | KeyCode::Char('d'), KeyModifiers::CONTROL) => return false,
            (KeyCode::Char('s'), KeyModifiers::CONTROL) => self.toggle_sources(),
            (KeyCode::Up, KeyModifiers::CONTROL) => self.select_cited_turn(true),
            (KeyCode::Down, KeyModifiers::CONTROL) => self.select_cited_turn(false),
            (KeyCode::PageUp, _) => self.scroll_sources(false),
            (KeyCode::PageDown, _) => self.scroll_sources(true),
            (KeyCode::F(2), _) => {
                let profile = self.engine.profile().toggle();
                self.switch_profile(profile);
            }
            (KeyCode::Esc, _) => {
                if self.is_streaming {
                    self.engine.cancel();
                } else {
                    self.selected_turn = None;
                }
            }
            (KeyCode::Up, _) => {
                let typed = self.input.value().to_string();
                if let Some(prompt) = self.history.older(&typed) {
                    self.input = Input::from(prompt.to_string());
                }
            }
            (KeyCode::Down, _) => {
                if let Some(prompt) = self.history.newer() {
                    self.input = Input::from(prompt);
                }
            }
            (KeyCode::Enter, _) => return self.handle_enter(),
            _ => {
                self.history.stop_browsing();
                self.input.handle_event(&Event::Key(key));
            }
        }
        true
    }

    fn handle_enter(&mut self) -> bool {
        let input_text = self.input.value().trim().to_string();
        if input_text.is_empty() {
            return true;
        }
        if input_text.starts_with('/') {
            self.input.reset();
            self.history.record(input_text.clone());
            return self.handle_command(&input_text);
        }
        if self.is_streaming {
            self.status_message = Some("Still answering. Esc cancels.".to_string());
            return true;
        }

        self.input.reset();
        self.history.record(input_text.clone());
        self.status_message = None;
        self.queue_message(input_text);
        true
    }
}

fn styled_content_line(line: &str) -> Line<'static> {
    if line.starts_with("```") {
        Line::from(Span::styled(line.to_string(), Style::default().fg(Color::DarkGray)))
    } else if line.starts_with("# ") {
        Line::from(Span::styled(
            line.to_string(),
            Style::default().fg(Color::Yellow).add_modifier(Modifier::BOLD),
        ))
    } else if line.starts_with("## ") || line.starts_with("### ") {
        Line::from(Span::styled(line.to_string(), Style::default().fg(Color::Yellow)))
    } else if line.starts_with("- ") || line.starts_with("* ") {
        Line::from(Span::styled(line.to_string(), Style::default().fg(Color::Cyan)))
    } else if line.starts_with('`') && line.ends_with('`') {
        Line::from(Span::styled(line.to_string(), Style::default().fg(Color::Magenta)))
    } else {
        Line::from(line.to_string())
    }
}

fn role_style(role: Role) -> Style {
    match role {
        Role::User => Style::default().fg(Color::Cyan),
        Role::Model => Style::default().fg(Color::Green),
    }
}

fn sources_lines(
    view: &TurnView<'_>,
    expanded: bool,
    selected: bool,
    offset: usize,
) -> Vec<Line<'static>> {
    let marker = if expanded { "▾" } else { "▸" };
    let mut header_style = Style::default().fg(Color::Blue);
    if selected {
        header_style = header_style.add_modifier(Modifier::REVERSED);
    }
    let mut lines = vec![Line::from(Span::styled(
        format!("{} {} ({})", marker, SOURCES_HEADING, view.citations.len()),
        header_style,
    ))];
    if !expanded {
        return lines;
    }

    let (start, shown) = visible_sources(view.citations, offset);
    for (i, citation) in shown.iter().enumerate() {
        let dim = Style::default().fg(Color::DarkGray);
        lines.push(Line::from(vec![
            Span::styled(format!("  {:>2}. ", start + i + 1), dim),
            Span::raw(citation.title.clone()),
            Span::styled(format!(" {}", citation.url), dim),
        ]));
    }
    if view.citations.len() > SOURCES_ROWS {
        lines.push(Line::from(Span::styled(
            format!(
                "  {}-{} of {} (PgUp/PgDn)",
                start + 1,
                start + shown.len(),
                view.citations.len()
            ),
            Style::default().fg(Color::DarkGray).add_modifier(Modifier::ITALIC),
        )));
    }
    lines
}

fn ui(f: &mut Frame, app: &mut App) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Min(1),    // Chat area
            Constraint::Length(3), // Input area
            Constraint::Length(1), // Status bar
        ])
        .split(f.area());

    let mut all_lines: Vec<Line> = Vec::new();

    for view in turn_views(&app.transcript) {
        all_lines.push(Line::from(Span::styled(
            format!("[{}]", view.label()),
            role_style(view.role).add_modifier(Modifier::BOLD),
        )));
        for line in view.content.lines() {
            all_lines.push(styled_content_line(line));
        }

        if view.has_sources() {
            let selected = app.selected_turn == Some(view.index);
            let offset = if selected { app.sources_offset } else { 0 };
            let expanded = app.expanded.contains(&view.index);
            all_lines.extend(sources_lines(&view, expanded, selected, offset));
        }

        all_lines.push(Line::from(""));
    }

    if app.is_streaming && !app.current_response.is_empty() {
        all_lines.push(Line::from(Span::styled(
            format!("[{}]", groundchat_core::view::role_label(Role::Model)),
            role_style(Role::Model).add_modifier(Modifier::BOLD),
        )));
        for line in app.current_response.lines() {
            all_lines.push(styled_content_line(line));
        }
        all_lines.push(Line::from(""));
    }

    // -2 for borders
    let wrap_width = chunks[0].width.saturating_sub(2) as usize;
    let all_lines: Vec<Line> = all_lines
        .into_iter()
        .flat_map(|line| wrap_line(line, wrap_width))
        .collect();

    // scroll_offset=0 means auto-scroll to bottom, higher values scroll up from bottom
    let total_lines = all_lines.len();
    let visible_height = chunks[0].height.saturating_sub(2) as usize; // -2 for borders
    let max_scroll = total_lines.saturating_sub(visible_height);

    if app.scroll_offset > max_scroll {
        app.scroll_offset = max_scroll;
    }
    let effective_scroll = max_scroll.saturating_sub(app.scroll_offset);

    let chat_content = Paragraph::new(all_lines)
        .block(Block::default().borders(Borders::ALL).title("groundchat"))
        .scroll((effective_scroll as u16, 0));

    f.render_widget(chat_content, chunks[0]);

    if total_lines > visible_height {
        let scrollbar = Scrollbar::new(ScrollbarOrientation::VerticalRight)
            .begin_symbol(Some("▲"))
            .end_symbol(Some("▼"));
        let mut scrollbar_state = ScrollbarState::new(max_scroll).position(effective_scroll);
        let scrollbar_area = chunks[0].inner(ratatui::layout::Margin {
            vertical: 1,
            horizontal: 0,
        });
        f.render_stateful_widget(scrollbar, scrollbar_area, &mut scrollbar_state);
    }

    let input_widget = if app.input.value().is_empty() {
        Paragraph::new(INPUT_PLACEHOLDER).style(Style::default().fg(Color::DarkGray))
    } else {
        Paragraph::new(app.input.value()).style(Style::default().fg(Color::White))
    };
    let input_widget =
        input_widget.block(Block::default().borders(Borders::ALL).title("Ask anything (/help)"));

    f.render_widget(input_widget, chunks[1]);

    let profile = app.engine.profile();
    let turn_count = app.transcript.len();
    let status = if app.is_streaming {
        Span::raw(format!(
            " {} | {} Searching the web... (Esc to cancel) ",
            profile,
            app.get_thinking_indicator()
        ))
    } else if let Some(ref err) = app.last_error {
        Span::styled(
            format!(" {} | Error: {} ", profile, err),
            Style::default().fg(Color::LightRed),
        )
    } else if let Some(ref msg) = app.status_message {
        Span::raw(format!(" {} | {} ", profile, msg))
    } else {
        Span::raw(format!(" {} | {} turns ", profile, turn_count))
    };

    let status_bar = Paragraph::new(Line::from(status))
        .style(Style::default().bg(Color::DarkGray).fg(Color::White));

    f.render_widget(status_bar, chunks[2]);

    f.set_cursor_position((
        chunks[1].x + app.input.visual_cursor() as u16 + 1,
        chunks[1].y + 1,
    ));
}

fn init_logging() -> Result<tracing_appender::non_blocking::WorkerGuard> {
    // Dev builds write a fresh ./groundchat.log each run; release builds
    // rotate daily under the data directory.
    #[cfg(debug_assertions)]
    let (non_blocking, guard) = {
        let path = std::path::PathBuf::from("./groundchat.log");
        let _ = std::fs::remove_file(&path);
        tracing_appender::non_blocking(std::fs::File::create(&path)?)
    };

    #[cfg(not(debug_assertions))]
    let (non_blocking, guard) = {
        let appender = config::PathManager::logs_dir().and_then(|dir| {
            std::fs::create_dir_all(&dir).ok()?;
            Builder::new()
                .rotation(Rotation::DAILY)
                .filename_prefix("groundchat")
                .filename_suffix("log")
                .build(dir)
                .ok()
        });
        match appender {
            Some(appender) => tracing_appender::non_blocking(appender),
            None => tracing_appender::non_blocking(std::fs::File::create("./groundchat.log")?),
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,groundchat_core=debug,llm=debug"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
        .init();

    Ok(guard)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let _guard = init_logging()?;
    tracing::info!("Starting groundchat TUI");

    load_env_file();

    // Configuration problems are reported before the terminal is taken over.
    let api_key = match ApiKey::from_env() {
        Ok(key) => key,
        Err(e) => {
            eprintln!("❌ {}", e);
            eprintln!("Set it in your environment or in a .env file.");
            std::process::exit(1);
        }
    };
    let mut settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("❌ {}", e);
            std::process::exit(1);
        }
    };
    if let Some(profile) = args.model {
        settings.default_profile = profile;
    }
    let mode = if args.no_stream { Mode::Sync } else { Mode::Stream };

    let base_url = settings.base_url.as_deref().unwrap_or(DEFAULT_BASE_URL);
    let provider = Arc::new(GeminiProvider::new(base_url, api_key.expose())?);
    let engine = ChatEngine::new(Session::new(), provider, &settings, mode);
    let mut app = App::new(engine);

    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen, EnableMouseCapture)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let result = run(&mut terminal, &mut app);

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen, DisableMouseCapture)?;
    terminal.show_cursor()?;

    result
}

fn run(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> Result<()> {
    loop {
        app.check_engine_events();
        app.refresh_transcript();
        terminal.draw(|f| ui(f, app))?;

        if app.is_streaming {
            app.advance_thinking_animation();
        }

        if event::poll(std::time::Duration::from_millis(100))? {
            match event::read()? {
                Event::Key(key) => {
                    if !app.handle_key_event(key) {
                        return Ok(());
                    }
                }
                Event::Mouse(mouse) => match mouse.kind {
                    MouseEventKind::ScrollUp => app.scroll_up(3),
                    MouseEventKind::ScrollDown => app.scroll_down(3),
                    _ => {}
                },
                _ => {}
            }
        }
    }
}
