use std::{
    io::{stdout, Stdout},
    thread,
    time::{Duration, Instant},
};

use anyhow::{Context, Result};
use clap::Parser;
use crossterm::{
    event::{self, Event, KeyCode, KeyEventKind},
    terminal::{disable_raw_mode, enable_raw_mode, EnterAlternateScreen, LeaveAlternateScreen},
    ExecutableCommand,
};
use ratatui::{
    backend::CrosstermBackend,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, Paragraph},
    Frame, Terminal,
};

use blockfall::game::{CellState, Game, GameEvent, GameState, TetrominoType};
use blockfall::search;

// ============================================================================
// Configuration
// ============================================================================

#[derive(Parser, Debug)]
#[command(name = "blockfall", about = "Terminal falling-block puzzle with an autoplayer")]
struct Args {
    /// Board width in columns. Fitted to the terminal when omitted.
    #[arg(long)]
    width: Option<usize>,

    /// Board height in rows. Fitted to the terminal when omitted.
    #[arg(long)]
    height: Option<usize>,

    /// Seed for piece generation. Restarts use seed + games played.
    #[arg(long)]
    seed: Option<u64>,

    /// Start with the autoplayer in control.
    #[arg(long)]
    ai: bool,

    /// Autoplayer ignores the next piece.
    #[arg(long)]
    greedy: bool,
}

const MANUAL_FRAME: Duration = Duration::from_millis(20);
const AI_FRAME: Duration = Duration::from_millis(1);
const AI_FALL_INTERVAL: Duration = Duration::from_millis(50);
const AI_DROP_INTERVAL: Duration = Duration::from_millis(5);
// The autoplayer waits until the piece has entered the board.
const AI_MIN_ROW: i16 = 1;

const SPAWN_ZONE_ROWS: usize = 3;

// ============================================================================
// Visual Constants
// ============================================================================

const CELL_WIDTH: u16 = 2;
const BLOCK_CHAR: &str = "██";
const EMPTY_CHAR: &str = "  ";
const SPAWN_ZONE_CHAR: &str = " ·";
const PREVIEW_WIDTH: u16 = 12;
const PREVIEW_HEIGHT: u16 = 6;
const INFO_WIDTH: u16 = 16;
const OVERLAY_WIDTH: u16 = 24;
const CONTROLS_HEIGHT: u16 = 3;

// ============================================================================
// Board Sizing
// ============================================================================

/// Fits the board to the terminal: 8..=14 columns, 16..=26 rows, and at
/// least 1.8 times as tall as wide. A board that would be too squat is
/// narrowed rather than grown past the rows available.
fn fitted_dimensions(term_cols: u16, term_rows: u16) -> (usize, usize) {
    let side_panels = PREVIEW_WIDTH + INFO_WIDTH + 2;
    let available_width = (term_cols.saturating_sub(side_panels) / CELL_WIDTH) as usize;
    let available_height = term_rows.saturating_sub(5) as usize;

    let mut width = available_width.clamp(8, 14);
    let height = available_height.clamp(16, 26);
    if (height as f64) < width as f64 * 1.8 {
        width = (height / 2).max(8);
    }
    (width, height)
}

fn board_dimensions(args: &Args) -> (usize, usize) {
    let (term_cols, term_rows) = crossterm::terminal::size().unwrap_or((80, 24));
    let (fit_width, fit_height) = fitted_dimensions(term_cols, term_rows);
    (args.width.unwrap_or(fit_width), args.height.unwrap_or(fit_height))
}

fn new_game(width: usize, height: usize, seed: Option<u64>) -> Result<Game> {
    let game = match seed {
        Some(seed) => Game::with_seed(width, height, seed)?,
        None => Game::new(width, height)?,
    };
    Ok(game)
}

// ============================================================================
// Autoplayer
// ============================================================================

struct Autoplayer {
    enabled: bool,
    greedy: bool,
    moved: bool,
}

impl Autoplayer {
    fn new(enabled: bool, greedy: bool) -> Self {
        Self {
            enabled,
            greedy,
            moved: false,
        }
    }

    fn attach(&mut self, game: &mut Game) {
        self.moved = false;
        let interval = self.enabled.then_some(AI_FALL_INTERVAL);
        game.set_fall_override(interval);
    }

    fn toggle(&mut self, game: &mut Game) {
        self.enabled = !self.enabled;
        self.attach(game);
    }

    /// Plans and steers once per piece; gravity does the rest.
    fn step(&mut self, game: &mut Game) {
        if !self.enabled || self.moved || game.state != GameState::Playing {
            return;
        }
        if game.current_piece.position.y < AI_MIN_ROW {
            return;
        }

        let choice = if self.greedy {
            search::best_move_greedy(game)
        } else {
            search::best_move(game)
        };
        if let Some(mv) = choice {
            search::execute_move(game, mv);
            game.set_fall_override(Some(AI_DROP_INTERVAL));
        }
        self.moved = true;
    }

    fn frame_interval(&self) -> Duration {
        if self.enabled {
            AI_FRAME
        } else {
            MANUAL_FRAME
        }
    }
}

// ============================================================================
// Session Summary
// ============================================================================

#[derive(Default)]
struct SessionStats {
    games: u32,
    pieces_locked: u32,
    clears: [u32; 4],
    best_score: u32,
    best_lines: u32,
}

impl SessionStats {
    fn record(&mut self, events: &[GameEvent]) {
        for event in events {
            match event {
                GameEvent::PieceLocked => self.pieces_locked += 1,
                GameEvent::LinesCleared(lines) => {
                    let idx = (*lines).clamp(1, 4) as usize - 1;
                    self.clears[idx] += 1;
                }
                _ => {}
            }
        }
    }

    fn finish(&mut self, game: &Game) {
        self.games += 1;
        self.best_score = self.best_score.max(game.score);
        self.best_lines = self.best_lines.max(game.lines_cleared);
    }

    fn print(&self) {
        println!("Games played:  {}", self.games);
        println!("Pieces locked: {}", self.pieces_locked);
        println!(
            "Clears:        {} single, {} double, {} triple, {} tetris",
            self.clears[0], self.clears[1], self.clears[2], self.clears[3]
        );
        println!("Best score:    {} ({} lines)", self.best_score, self.best_lines);
    }
}

// ============================================================================
// Rendering
// ============================================================================

fn piece_color(kind: TetrominoType) -> Color {
    use TetrominoType as K;
    match kind {
        K::I => Color::Cyan,
        K::O => Color::Yellow,
        K::T => Color::Magenta,
        K::S => Color::Green,
        K::Z => Color::Red,
        K::J => Color::Blue,
        K::L => Color::Rgb(255, 140, 0),
    }
}

fn block_span(kind: TetrominoType) -> Span<'static> {
    Span::styled(BLOCK_CHAR, Style::default().fg(piece_color(kind)))
}

fn panel(title: &str) -> Block<'_> {
    Block::default()
        .borders(Borders::ALL)
        .title(title)
        .title_alignment(Alignment::Center)
}

/// Draws a bordered panel and returns the area inside its border.
fn draw_panel(frame: &mut Frame, title: &str, area: Rect) -> Rect {
    let block = panel(title);
    let inner = block.inner(area);
    frame.render_widget(block, area);
    inner
}

fn render(frame: &mut Frame, game: &Game, ai: &Autoplayer) {
    let area = frame.size();
    render_game(frame, game, ai, area);

    match game.state {
        GameState::Playing => {}
        GameState::Paused => render_overlay(
            frame,
            area,
            " Paused ",
            vec![
                Line::from(Span::styled("PAUSED", Style::default().fg(Color::Yellow))),
                Line::from(""),
                hint("P: resume  Q: quit"),
            ],
        ),
        GameState::GameOver => render_overlay(
            frame,
            area,
            " Game Over ",
            vec![
                Line::from(Span::styled("GAME OVER", Style::default().fg(Color::Red))),
                Line::from(""),
                Line::from(format!("Score {}", game.score)),
                Line::from(format!("Lines {}", game.lines_cleared)),
                Line::from(format!("Level {}", game.level)),
                Line::from(""),
                hint("R: restart  Q: quit"),
            ],
        ),
    }
}

fn hint(text: &str) -> Line<'_> {
    Line::from(Span::styled(text, Style::default().fg(Color::DarkGray)))
}

fn render_game(frame: &mut Frame, game: &Game, ai: &Autoplayer, area: Rect) {
    let board_width = game.width() as u16 * CELL_WIDTH + 2;
    let board_height = game.height() as u16 + 2;
    let layout_area = centered(
        board_width + PREVIEW_WIDTH + INFO_WIDTH,
        board_height + CONTROLS_HEIGHT,
        area,
    );

    let rows = Layout::vertical([Constraint::Length(board_height), Constraint::Fill(1)])
        .split(layout_area);
    let (play_row, controls_row) = (rows[0], rows[1]);

    let columns = Layout::horizontal([
        Constraint::Length(board_width),
        Constraint::Length(PREVIEW_WIDTH),
        Constraint::Length(INFO_WIDTH),
    ])
    .split(play_row);
    let (board_area, side_area, info_area) = (columns[0], columns[1], columns[2]);
    let preview_area = Rect {
        height: PREVIEW_HEIGHT.min(side_area.height),
        ..side_area
    };

    render_board(frame, game, board_area);
    render_preview(frame, game, preview_area);
    render_info(frame, game, ai, info_area);

    let controls = Paragraph::new(vec![
        hint("A/D ←→ move  W/↑ rotate  Z counter-rotate  S/↓ soft drop  Space drop"),
        hint("I autoplay  P pause  R restart  Q/Esc quit"),
    ])
    .alignment(Alignment::Center);
    let controls_row = Rect {
        x: area.x,
        width: area.width,
        ..controls_row
    };
    frame.render_widget(controls, controls_row);
}

fn render_board(frame: &mut Frame, game: &Game, area: Rect) {
    let inner = draw_panel(frame, " Blockfall ", area);
    let spawn_marker = Span::styled(SPAWN_ZONE_CHAR, Style::default().fg(Color::DarkGray));

    let lines: Vec<Line> = game
        .render_grid()
        .into_iter()
        .enumerate()
        .map(|(y, row)| {
            let spans: Vec<Span> = row
                .into_iter()
                .map(|cell| match cell {
                    CellState::Filled(kind) => block_span(kind),
                    CellState::Empty if y < SPAWN_ZONE_ROWS => spawn_marker.clone(),
                    CellState::Empty => Span::raw(EMPTY_CHAR),
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    frame.render_widget(Paragraph::new(lines), inner);
}

fn render_preview(frame: &mut Frame, game: &Game, area: Rect) {
    let inner = draw_panel(frame, " Next ", area);

    let kind = game.next_piece.tetromino_type;
    let shape = &kind.shapes()[0];
    let lines: Vec<Line> = (0..shape.height)
        .map(|y| {
            let spans: Vec<Span> = (0..shape.width)
                .map(|x| {
                    if shape.cells.contains(&(x, y)) {
                        block_span(kind)
                    } else {
                        Span::raw(EMPTY_CHAR)
                    }
                })
                .collect();
            Line::from(spans)
        })
        .collect();

    let preview = Paragraph::new(lines).alignment(Alignment::Center);
    frame.render_widget(preview, centered(inner.width, shape.height as u16, inner));
}

fn render_info(frame: &mut Frame, game: &Game, ai: &Autoplayer, area: Rect) {
    let inner = draw_panel(frame, " Info ", area);

    let mode = match (ai.enabled, ai.greedy) {
        (false, _) => "Manual".to_string(),
        (true, false) => "AI".to_string(),
        (true, true) => "AI greedy".to_string(),
    };
    let stats = [
        ("Score", Color::Yellow, game.score.to_string()),
        ("Lines", Color::Cyan, game.lines_cleared.to_string()),
        ("Level", Color::Green, game.level.to_string()),
        ("Mode", Color::Magenta, mode),
    ];

    let mut lines = Vec::with_capacity(stats.len() * 3);
    for (label, color, value) in stats {
        lines.push(Line::from(""));
        lines.push(Line::from(Span::styled(label, Style::default().fg(color))));
        lines.push(Line::from(value));
    }

    frame.render_widget(Paragraph::new(lines).alignment(Alignment::Center), inner);
}

fn render_overlay(frame: &mut Frame, area: Rect, title: &str, mut lines: Vec<Line>) {
    lines.insert(0, Line::from(""));
    let popup = centered(OVERLAY_WIDTH, lines.len() as u16 + 3, area);
    let paragraph = Paragraph::new(lines)
        .alignment(Alignment::Center)
        .block(panel(title).style(Style::default().bg(Color::Black)));

    frame.render_widget(Clear, popup);
    frame.render_widget(paragraph, popup);
}

/// A `width` x `height` rectangle centred in `area`, shrunk to fit.
fn centered(width: u16, height: u16, area: Rect) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

// ============================================================================
// Input
// ============================================================================

fn handle_manual_key(game: &mut Game, code: KeyCode) {
    match code {
        KeyCode::Left | KeyCode::Char('a') | KeyCode::Char('A') => {
            game.move_piece(-1);
        }
        KeyCode::Right | KeyCode::Char('d') | KeyCode::Char('D') => {
            game.move_piece(1);
        }
        KeyCode::Up | KeyCode::Char('w') | KeyCode::Char('W') => {
            game.rotate_cw();
        }
        KeyCode::Char('z') | KeyCode::Char('Z') => {
            game.rotate_piece(false);
        }
        KeyCode::Down | KeyCode::Char('s') | KeyCode::Char('S') => {
            game.soft_drop();
            game.reset_fall_timer(Instant::now());
        }
        KeyCode::Char(' ') => game.hard_drop(),
        _ => {}
    }
}

// ============================================================================
// Main Loop
// ============================================================================

type Tui = Terminal<CrosstermBackend<Stdout>>;

fn run(terminal: &mut Tui, args: &Args, mut game: Game, stats: &mut SessionStats) -> Result<()> {
    let mut ai = Autoplayer::new(args.ai, args.greedy);
    ai.attach(&mut game);

    loop {
        if event::poll(Duration::ZERO)? {
            if let Event::Key(key) = event::read()? {
                if key.kind == KeyEventKind::Press {
                    match key.code {
                        KeyCode::Esc | KeyCode::Char('q') | KeyCode::Char('Q') => break,
                        KeyCode::Char('p') | KeyCode::Char('P') => game.toggle_pause(),
                        KeyCode::Char('i') | KeyCode::Char('I') => ai.toggle(&mut game),
                        KeyCode::Char('r') | KeyCode::Char('R') if game.is_game_over() => {
                            stats.finish(&game);
                            let (width, height) = board_dimensions(args);
                            let seed = args.seed.map(|s| s.wrapping_add(u64::from(stats.games)));
                            game = new_game(width, height, seed)?;
                            ai.attach(&mut game);
                            continue;
                        }
                        code if game.state == GameState::Playing && !ai.enabled => {
                            handle_manual_key(&mut game, code);
                        }
                        _ => {}
                    }
                }
            }
        }

        ai.step(&mut game);
        game.tick(Instant::now());

        let events = game.take_events();
        if events.contains(&GameEvent::PieceLocked) {
            ai.attach(&mut game);
        }
        stats.record(&events);

        terminal.draw(|frame| render(frame, &game, &ai))?;
        thread::sleep(ai.frame_interval());
    }

    stats.finish(&game);
    Ok(())
}

fn restore_terminal() -> Result<()> {
    disable_raw_mode().context("failed to leave raw mode")?;
    stdout()
        .execute(LeaveAlternateScreen)
        .context("failed to leave alternate screen")?;
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let (width, height) = board_dimensions(&args);
    let game = new_game(width, height, args.seed)?;

    enable_raw_mode().context("failed to enable raw mode")?;
    stdout()
        .execute(EnterAlternateScreen)
        .context("failed to enter alternate screen")?;

    let mut stats = SessionStats::default();
    let result = Terminal::new(CrosstermBackend::new(stdout()))
        .context("failed to initialise terminal")
        .and_then(|mut terminal| run(&mut terminal, &args, game, &mut stats));

    restore_terminal()?;
    result?;

    stats.print();
    Ok(())
}
