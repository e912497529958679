use std::io;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crossterm::event::{Event, EventStream, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use rag::{Answer, ChatSession, Config as RagConfig, GENERIC_ERROR_MESSAGE, Mode, open_session};
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use ratatui::layout::{Constraint, Direction, Layout, Margin, Rect};
use ratatui::style::{Color, Modifier, Style};
use ratatui::widgets::{Block, Paragraph, Scrollbar, ScrollbarOrientation, ScrollbarState, Wrap};
use tokio::sync::mpsc;
use tracing::{error, info};

type SharedSession = Arc<Mutex<ChatSession>>;

pub async fn run(cfg: RagConfig) -> io::Result<()> {
    enable_raw_mode()?;
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend)?;

    let mut app = App::new(&cfg);
    let res = run_app(&mut terminal, &mut app, cfg).await;

    disable_raw_mode()?;
    execute!(terminal.backend_mut(), LeaveAlternateScreen)?;
    terminal.show_cursor()?;

    res
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Speaker {
    You,
    Assistant,
    Notice,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum OutputFocus {
    Conversation,
    Context,
}

enum Response {
    Opened(Result<SharedSession, String>),
    Answer(Result<Answer, String>),
    Index(Result<usize, String>),
    ModeChanged(Result<Mode, String>),
}

struct Pane {
    scroll: usize,
    content_len: usize,
    view_height: usize,
    auto_scroll: bool,
}

impl Pane {
    fn new() -> Self {
        Self {
            scroll: 0,
            content_len: 0,
            view_height: 0,
            auto_scroll: false,
        }
    }

    fn max_scroll(&self) -> usize {
        self.content_len.saturating_sub(self.view_height)
    }

    /// Records the rendered size and clamps or follows the scroll position.
    fn layout(&mut self, content_len: usize, view_height: usize) {
        self.content_len = content_len;
        self.view_height = view_height;
        if self.auto_scroll {
            self.scroll = self.max_scroll();
            self.auto_scroll = false;
        } else if self.scroll > self.max_scroll() {
            self.scroll = self.max_scroll();
        }
    }
}

struct App {
    input: String,
    /// Cursor position in chars, not bytes.
    cursor: usize,
    session: Option<SharedSession>,
    document_label: String,
    mode: Mode,
    transcript: Vec<(Speaker, String)>,
    context: Option<String>,
    output_focus: OutputFocus,
    conversation_pane: Pane,
    context_pane: Pane,
    is_loading: bool,
    spinner_idx: usize,
}

impl App {
    fn new(cfg: &RagConfig) -> Self {
        Self {
            input: String::new(),
            cursor: 0,
            session: None,
            document_label: cfg.document_path.display().to_string(),
            mode: cfg.mode,
            transcript: vec![(
                Speaker::Notice,
                format!("Loading {}...", cfg.document_path.display()),
            )],
            context: None,
            output_focus: OutputFocus::Conversation,
            conversation_pane: Pane::new(),
            context_pane: Pane::new(),
            is_loading: true,
            spinner_idx: 0,
        }
    }

    fn insert_char(&mut self, c: char) {
        let at = byte_index(&self.input, self.cursor);
        self.input.insert(at, c);
        self.cursor += 1;
    }

    fn delete_char(&mut self) {
        if self.cursor == 0 {
            return;
        }
        self.cursor -= 1;
        let at = byte_index(&self.input, self.cursor);
        self.input.remove(at);
    }

    fn move_left(&mut self) {
        if self.cursor > 0 {
            self.cursor -= 1;
        }
    }

    fn move_right(&mut self) {
        if self.cursor < self.input.chars().count() {
            self.cursor += 1;
        }
    }

    fn notice(&mut self, text: impl Into<String>) {
        self.transcript.push((Speaker::Notice, text.into()));
        self.conversation_pane.auto_scroll = true;
    }

    fn ready_session(&self) -> Option<SharedSession> {
        if self.is_loading {
            return None;
        }
        self.session.clone()
    }

    fn submit(&mut self, tx: mpsc::UnboundedSender<Response>) {
        if self.input.trim().is_empty() {
            return;
        }
        let Some(session) = self.ready_session() else {
            return;
        };

        let question = self.input.trim().to_string();
        self.transcript.push((Speaker::You, question.clone()));
        self.conversation_pane.auto_scroll = true;
        self.is_loading = true;
        self.input.clear();
        self.cursor = 0;

        tokio::task::spawn_blocking(move || {
            let result = with_session(&session, |s| s.ask(&question));
            let _ = tx.send(Response::Answer(result));
        });
    }

    fn new_conversation(&mut self) {
        let Some(session) = self.ready_session() else {
            return;
        };
        if let Ok(mut s) = session.lock() {
            s.clear_history();
        }
        self.transcript.clear();
        self.context = None;
        self.notice("New conversation started.");
    }

    fn toggle_mode(&mut self, tx: mpsc::UnboundedSender<Response>) {
        let Some(session) = self.ready_session() else {
            return;
        };
        let target = self.mode.toggled();
        if target == Mode::Rag {
            self.notice("Switching to rag mode, indexing the document if needed...");
        }
        self.is_loading = true;
        tokio::task::spawn_blocking(move || {
            let result = with_session(&session, |s| s.set_mode(target).map(|_| target));
            let _ = tx.send(Response::ModeChanged(result));
        });
    }

    fn rebuild_index(&mut self, tx: mpsc::UnboundedSender<Response>) {
        let Some(session) = self.ready_session() else {
            return;
        };
        self.is_loading = true;
        self.notice("Rebuilding the embedding index...");
        tokio::task::spawn_blocking(move || {
            let result = with_session(&session, |s| s.rebuild_index());
            let _ = tx.send(Response::Index(result));
        });
    }

    fn apply(&mut self, response: Response) {
        self.is_loading = false;
        match response {
            Response::Opened(Ok(session)) => {
                if let Ok(s) = session.lock() {
                    self.document_label = s.document().name.clone();
                    self.mode = s.mode();
                    let chunks = s.chunk_count();
                    self.transcript.clear();
                    self.notice(format!(
                        "Loaded {} ({} chars, {} chunks). Ask a question below.",
                        s.document().name,
                        s.document().char_len(),
                        chunks
                    ));
                }
                self.session = Some(session);
            }
            Response::Opened(Err(_)) => {
                self.notice("Could not open the document.");
                self.notice(GENERIC_ERROR_MESSAGE);
            }
            Response::Answer(Ok(answer)) => {
                self.context = Some(self.describe_context(&answer));
                self.context_pane.auto_scroll = true;
                self.transcript.push((Speaker::Assistant, answer.text));
                self.conversation_pane.auto_scroll = true;
            }
            Response::Answer(Err(_)) => {
                self.notice(GENERIC_ERROR_MESSAGE);
            }
            Response::Index(Ok(chunks)) => {
                self.notice(format!("Index rebuilt ({chunks} chunks)."));
            }
            Response::Index(Err(_)) | Response::ModeChanged(Err(_)) => {
                self.notice(GENERIC_ERROR_MESSAGE);
            }
            Response::ModeChanged(Ok(mode)) => {
                self.mode = mode;
                self.notice(format!("Mode: {}", mode_label(mode)));
            }
        }
    }

    fn describe_context(&self, answer: &Answer) -> String {
        if answer.sources.is_empty() {
            if self.mode == Mode::Full {
                return format!(
                    "Full document sent as context ({} chars).",
                    answer.context.chars().count()
                );
            }
            return answer.context.clone();
        }
        answer
            .sources
            .iter()
            .enumerate()
            .map(|(i, hit)| {
                format!(
                    "[{}] chunk {} (score {:.3})\n{}",
                    i + 1,
                    hit.chunk.index,
                    hit.score,
                    hit.chunk.text
                )
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }

    fn focused_pane(&mut self) -> &mut Pane {
        match self.output_focus {
            OutputFocus::Conversation => &mut self.conversation_pane,
            OutputFocus::Context => &mut self.context_pane,
        }
    }

    fn scroll_up(&mut self, by: usize) {
        let pane = self.focused_pane();
        pane.scroll = pane.scroll.saturating_sub(by);
    }

    fn scroll_down(&mut self, by: usize) {
        let pane = self.focused_pane();
        pane.scroll = (pane.scroll + by).min(pane.max_scroll());
    }

    fn scroll_to_start(&mut self) {
        self.focused_pane().scroll = 0;
    }

    fn scroll_to_end(&mut self) {
        let pane = self.focused_pane();
        pane.scroll = pane.max_scroll();
    }

    fn focused_view_height(&mut self) -> usize {
        self.focused_pane().view_height
    }

    fn transcript_text(&self) -> String {
        let mut out = Vec::with_capacity(self.transcript.len());
        for (speaker, text) in &self.transcript {
            out.push(match speaker {
                Speaker::You => format!("You: {text}"),
                Speaker::Assistant => format!("Assistant: {text}"),
                Speaker::Notice => format!("-- {text}"),
            });
        }
        out.join("\n\n")
    }
}

fn with_session<T>(
    session: &SharedSession,
    f: impl FnOnce(&mut ChatSession) -> rag::Result<T>,
) -> Result<T, String> {
    let mut guard = session
        .lock()
        .map_err(|_| "chat session lock poisoned".to_string())?;
    f(&mut *guard).map_err(|err| {
        error!(error = %err, "request failed");
        err.to_string()
    })
}

fn mode_label(mode: Mode) -> &'static str {
    match mode {
        Mode::Full => "full document",
        Mode::Rag => "rag",
    }
}

fn byte_index(s: &str, char_idx: usize) -> usize {
    s.char_indices()
        .nth(char_idx)
        .map(|(i, _)| i)
        .unwrap_or(s.len())
}

/// The slice of `input` that fits `max_width`, kept around the cursor, and
/// the cursor column inside it.
fn input_view(input: &str, cursor: usize, max_width: usize) -> (String, usize) {
    if max_width == 0 {
        return (String::new(), 0);
    }
    let chars: Vec<char> = input.chars().collect();
    let len = chars.len();
    let cursor = cursor.min(len);
    if len <= max_width {
        return (input.to_string(), cursor);
    }
    let mut start = cursor.saturating_sub(max_width / 2);
    if start + max_width > len {
        start = len - max_width;
    }
    let view: String = chars[start..start + max_width].iter().collect();
    (view, cursor.saturating_sub(start).min(max_width))
}

fn inner_width(area: Rect) -> usize {
    area.width.saturating_sub(2) as usize
}

fn inner_height(area: Rect) -> usize {
    area.height.saturating_sub(2) as usize
}

/// Paragraph scroll offset; ratatui takes `u16` rows.
fn scroll_row(scroll: usize) -> u16 {
    u16::try_from(scroll).unwrap_or(u16::MAX)
}

/// Rows `text` occupies once wrapped to `width`.
fn wrapped_line_count(text: &str, width: usize) -> usize {
    if width == 0 {
        return text.lines().count().max(1);
    }
    let count: usize = text
        .lines()
        .map(|line| line.chars().count().div_ceil(width).max(1))
        .sum();
    count.max(1)
}

fn draw_ui(terminal: &mut Terminal<CrosstermBackend<io::Stdout>>, app: &mut App) -> io::Result<()> {
    let spinner = ["|", "/", "-", "\\"];

    terminal.draw(|frame| {
        let title_style = Style::default().fg(Color::Black).add_modifier(Modifier::BOLD);
        let info_border = Style::default().fg(Color::Black);
        let input_border = Style::default().fg(Color::DarkGray);
        let help_border = Style::default().fg(Color::DarkGray);
        let info_text_style = Style::default().fg(Color::Blue);
        let help_text_style = Style::default().fg(Color::DarkGray);
        let input_text_style = Style::default().fg(Color::DarkGray);

        let area = frame.area();
        let chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([
                Constraint::Min(8),
                Constraint::Length(3),
                Constraint::Length(3),
            ])
            .split(area);
        let output_chunks = Layout::default()
            .direction(Direction::Vertical)
            .constraints([Constraint::Percentage(65), Constraint::Percentage(35)])
            .split(chunks[0]);

        let focus_mark = |focus: OutputFocus| if app.output_focus == focus { " *" } else { "" };
        let busy = if app.is_loading {
            format!(" {}", spinner[app.spinner_idx])
        } else {
            String::new()
        };
        let conversation_title = format!(
            "{} [{}]{}{}",
            app.document_label,
            mode_label(app.mode),
            busy,
            focus_mark(OutputFocus::Conversation)
        );
        let context_title = format!("Context{}", focus_mark(OutputFocus::Context));

        let conversation_text = app.transcript_text();
        let context_text = app
            .context
            .clone()
            .unwrap_or_else(|| "The context used for the last answer appears here.".to_string());

        app.conversation_pane.layout(
            wrapped_line_count(&conversation_text, inner_width(output_chunks[0])),
            inner_height(output_chunks[0]),
        );
        app.context_pane.layout(
            wrapped_line_count(&context_text, inner_width(output_chunks[1])),
            inner_height(output_chunks[1]),
        );

        let panes = [
            (conversation_title, conversation_text, &app.conversation_pane, output_chunks[0]),
            (context_title, context_text, &app.context_pane, output_chunks[1]),
        ];
        for (title, text, pane, rect) in panes {
            let block = Block::bordered()
                .title(title)
                .title_style(title_style)
                .border_style(info_border);
            let paragraph = Paragraph::new(text)
                .style(info_text_style)
                .scroll((scroll_row(pane.scroll), 0))
                .wrap(Wrap { trim: false })
                .block(block);
            frame.render_widget(paragraph, rect);

            let mut scrollbar = ScrollbarState::new(pane.content_len).position(pane.scroll);
            let scrollbar_widget = Scrollbar::new(ScrollbarOrientation::VerticalRight)
                .track_style(Style::default().fg(Color::DarkGray))
                .thumb_style(Style::default().fg(Color::Blue));
            frame.render_stateful_widget(
                scrollbar_widget,
                rect.inner(Margin {
                    vertical: 1,
                    horizontal: 0,
                }),
                &mut scrollbar,
            );
        }

        let input_block = Block::bordered()
            .title("Question")
            .title_style(title_style)
            .border_style(input_border);
        let (input_text, cursor_x) = input_view(&app.input, app.cursor, inner_width(chunks[1]));
        let input = Paragraph::new(input_text)
            .style(input_text_style)
            .block(input_block);
        frame.render_widget(input, chunks[1]);
        frame.set_cursor_position((chunks[1].x + 1 + cursor_x as u16, chunks[1].y + 1));

        let help_block = Block::bordered()
            .title("Controls")
            .title_style(title_style)
            .border_style(help_border);
        let help = Paragraph::new(
            "Enter: Ask | Tab: Full/RAG | Ctrl+L: New chat | Ctrl+R: Reindex | Ctrl+O: Focus | Up/Down/PgUp/PgDn/Home/End: Scroll | Esc/Ctrl+C: Quit",
        )
        .style(help_text_style)
        .wrap(Wrap { trim: true })
        .block(help_block);
        frame.render_widget(help, chunks[2]);
    })?;

    Ok(())
}

async fn run_app(
    terminal: &mut Terminal<CrosstermBackend<io::Stdout>>,
    app: &mut App,
    cfg: RagConfig,
) -> io::Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Response>();
    let mut events = EventStream::new();
    let mut spinner_tick = tokio::time::interval(Duration::from_millis(100));
    spinner_tick.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    let open_tx = tx.clone();
    tokio::task::spawn_blocking(move || {
        let result = open_session(cfg)
            .map(|session| Arc::new(Mutex::new(session)))
            .map_err(|err| {
                error!(error = %err, "failed to open session");
                err.to_string()
            });
        let _ = open_tx.send(Response::Opened(result));
    });

    draw_ui(terminal, app)?;

    loop {
        tokio::select! {
            _ = spinner_tick.tick() => {
                if app.is_loading {
                    app.spinner_idx = (app.spinner_idx + 1) % 4;
                    draw_ui(terminal, app)?;
                }
            }
            maybe_result = rx.recv() => {
                if let Some(result) = maybe_result {
                    app.apply(result);
                    draw_ui(terminal, app)?;
                }
            }
            maybe_event = events.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        let ctrl = key.modifiers.contains(KeyModifiers::CONTROL);
                        match key.code {
                            KeyCode::Char('c') if ctrl => break,
                            KeyCode::Char('l') if ctrl => app.new_conversation(),
                            KeyCode::Char('r') if ctrl => app.rebuild_index(tx.clone()),
                            KeyCode::Char('o') if ctrl => {
                                app.output_focus = match app.output_focus {
                                    OutputFocus::Conversation => OutputFocus::Context,
                                    OutputFocus::Context => OutputFocus::Conversation,
                                };
                            }
                            KeyCode::Esc => break,
                            KeyCode::Enter => app.submit(tx.clone()),
                            KeyCode::Tab => app.toggle_mode(tx.clone()),
                            KeyCode::Up => app.scroll_up(1),
                            KeyCode::Down => app.scroll_down(1),
                            KeyCode::PageUp => {
                                let by = app.focused_view_height().max(1);
                                app.scroll_up(by);
                            }
                            KeyCode::PageDown => {
                                let by = app.focused_view_height().max(1);
                                app.scroll_down(by);
                            }
                            KeyCode::Home => app.scroll_to_start(),
                            KeyCode::End => app.scroll_to_end(),
                            KeyCode::Left => app.move_left(),
                            KeyCode::Right => app.move_right(),
                            KeyCode::Backspace => app.delete_char(),
                            KeyCode::Char(ch) => app.insert_char(ch),
                            _ => {}
                        }
                        draw_ui(terminal, app)?;
                    }
                    Some(Ok(Event::Resize(_, _))) => draw_ui(terminal, app)?,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => {}
                    None => break,
                }
            }
        }
    }

    info!("leaving chat");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn app() -> App {
        App::new(&RagConfig::default())
    }

    #[test]
    fn editing_accented_input_is_char_based() {
        let mut app = app();
        for c in "ação".chars() {
            app.insert_char(c);
        }
        assert_eq!(app.cursor, 4);
        app.move_left();
        app.delete_char();
        assert_eq!(app.input, "aço");
        app.insert_char('ã');
        assert_eq!(app.input, "ação");
        app.move_right();
        app.move_right();
        assert_eq!(app.cursor, 4);
    }

    #[test]
    fn input_view_keeps_cursor_visible() {
        assert_eq!(input_view("abc", 2, 10), ("abc".to_string(), 2));
        let (view, x) = input_view("abcdefghij", 9, 4);
        assert_eq!(view, "ghij");
        assert_eq!(x, 3);
        let (view, x) = input_view("çççççççç", 0, 3);
        assert_eq!(view, "ççç");
        assert_eq!(x, 0);
        assert_eq!(input_view("abc", 1, 0), (String::new(), 0));
    }

    #[test]
    fn wrapped_line_count_accounts_for_width() {
        assert_eq!(wrapped_line_count("", 10), 1);
        assert_eq!(wrapped_line_count("abcdef", 3), 2);
        assert_eq!(wrapped_line_count("ab\n\ncdefg", 3), 4);
    }

    #[test]
    fn pane_follows_or_clamps_scroll() {
        let mut pane = Pane::new();
        pane.auto_scroll = true;
        pane.layout(30, 10);
        assert_eq!(pane.scroll, 20);
        assert!(!pane.auto_scroll);
        pane.layout(12, 10);
        assert_eq!(pane.scroll, 2);
    }

    #[test]
    fn failed_answer_shows_generic_message() {
        let mut app = app();
        app.apply(Response::Answer(Err("POST http://x failed: 500".to_string())));
        let (speaker, text) = app.transcript.last().cloned().unwrap();
        assert_eq!(speaker, Speaker::Notice);
        assert_eq!(text, GENERIC_ERROR_MESSAGE);
        assert!(!app.is_loading);
    }

    #[test]
    fn scroll_row_saturates() {
        assert_eq!(scroll_row(12), 12);
        assert_eq!(scroll_row(70_000), u16::MAX);
    }

    #[test]
    fn failed_open_shows_generic_message() {
        let mut app = app();
        app.apply(Response::Opened(Err(
            "failed to read document.pdf: No such file or directory (os error 2)".to_string(),
        )));
        assert!(app.session.is_none());
        assert!(app.transcript.iter().all(|(_, text)| !text.contains("os error")));
        let (speaker, text) = app.transcript.last().cloned().unwrap();
        assert_eq!(speaker, Speaker::Notice);
        assert_eq!(text, GENERIC_ERROR_MESSAGE);
    }

    #[test]
    fn submit_is_ignored_until_session_is_open() {
        let mut app = app();
        let (tx, _rx) = mpsc::unbounded_channel();
        app.input = "Qual o prazo?".to_string();
        app.submit(tx);
        assert_eq!(app.input, "Qual o prazo?");
        assert_eq!(app.transcript.len(), 1);
    }
}
