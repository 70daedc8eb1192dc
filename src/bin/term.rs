use std::time::{Duration, Instant};

use anyhow::Context;
use clap::Parser;
use crossterm::event::{self, Event, KeyCode, KeyEvent, KeyEventKind};
use ratatui::{
    DefaultTerminal, Frame,
    buffer::Buffer,
    layout::{Alignment, Constraint, Layout, Rect},
    style::Stylize,
    text::{Line, Span},
    widgets::{Block, Paragraph, Widget},
};

use chip8_vm::{
    cli::{KEYPAD_ROWS, MachineArgs, describe_error, keypad_key_for_char},
    emu::{Chip8Runner, DISPLAY_X, DISPLAY_Y, ExecState, FrameBuffer},
};

/// Two framebuffer rows share one terminal row, drawn with half blocks.
const DISPLAY_ROWS: u16 = DISPLAY_Y as u16 / 2;
const SIDE_WIDTH: u16 = 14;

// Key release events are not fired in terminals on Linux.
// To handle this, we implement a timeout after which we consider a key released.
const KEY_RELEASE_TIMEOUT: Duration = Duration::from_millis(50);

struct App {
    runner: Chip8Runner,
    output: String,
    should_quit: bool,
    last_tick: Instant,
    key_press_times: [Option<Instant>; 16],
}

impl App {
    fn new(args: &MachineArgs, rom: &[u8]) -> anyhow::Result<Self> {
        let runner = args
            .build_runner(rom)
            .context("Failed to load ROM into CHIP-8 memory")?;

        Ok(Self {
            runner,
            output: String::new(),
            should_quit: false,
            last_tick: Instant::now(),
            key_press_times: [None; 16],
        })
    }

    fn run(&mut self, terminal: &mut DefaultTerminal) -> anyhow::Result<()> {
        while !self.should_quit {
            let dt = self.last_tick.elapsed().as_secs_f32();
            self.last_tick = Instant::now();

            if let Err(e) = self.runner.update(dt) {
                log::warn!("Machine stopped: {e}");
                self.output = describe_error(&e);
            }

            terminal.draw(|frame| self.draw(frame))?;

            self.check_key_timeout();

            if event::poll(Duration::from_millis(16))? {
                if let Event::Key(key) = event::read()? {
                    self.handle_key_event(key);
                }
            }
        }

        Ok(())
    }

    fn draw(&self, frame: &mut Frame) {
        frame.render_widget(self, frame.area());
    }

    fn check_key_timeout(&mut self) {
        let now = Instant::now();

        for key in KEYPAD_ROWS.into_iter().flatten() {
            if let Some(time) = self.key_press_times[key]
                && now.duration_since(time) > KEY_RELEASE_TIMEOUT
            {
                self.key_press_times[key] = None;
                self.runner.set_key(key, false);
            }
        }
    }

    fn handle_key_event(&mut self, key: KeyEvent) {
        // Handle Ctrl+C globally
        if key.code == KeyCode::Char('c') && key.modifiers.contains(event::KeyModifiers::CONTROL) {
            self.should_quit = true;
            return;
        }

        match key.code {
            KeyCode::Esc => {
                self.should_quit = true;
            }
            KeyCode::Backspace if key.kind == KeyEventKind::Press => {
                self.output = match self.runner.restart() {
                    Ok(()) => "Restarted".to_string(),
                    Err(e) => describe_error(&e),
                };
            }
            KeyCode::Char(c) => {
                let Some(pad_key) = keypad_key_for_char(c) else {
                    return;
                };
                let released = key.kind == KeyEventKind::Release;
                self.key_press_times[pad_key] = (!released).then(Instant::now);
                self.runner.set_key(pad_key, !released);
            }
            _ => {}
        }
    }
}

impl Widget for &App {
    fn render(self, area: Rect, buf: &mut Buffer) {
        const MIN_WIDTH: u16 = DISPLAY_X as u16 + 2 + SIDE_WIDTH;
        const MIN_HEIGHT: u16 = DISPLAY_ROWS + 2 + 3;
        if area.width < MIN_WIDTH || area.height < MIN_HEIGHT {
            Line::from(format!("Need at least {MIN_WIDTH}x{MIN_HEIGHT} cells"))
                .red()
                .centered()
                .render(area, buf);
            return;
        }

        let [left, right] = Layout::horizontal([
            Constraint::Min(DISPLAY_X as u16 + 2),
            Constraint::Length(SIDE_WIDTH),
        ])
        .areas(area);
        let [display, output] = Layout::vertical([
            Constraint::Length(DISPLAY_ROWS + 2),
            Constraint::Min(3),
        ])
        .areas(left);
        let [state, timers, keypad] = Layout::vertical([
            Constraint::Length(3),
            Constraint::Length(4),
            Constraint::Min(6),
        ])
        .areas(right);

        Paragraph::new(half_block_lines(self.runner.display()))
            .green()
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Display "))
            .render(display, buf);
        Paragraph::new(self.output.as_str())
            .block(Block::bordered().title(" Output "))
            .render(output, buf);

        self.render_state(state, buf);
        self.render_timers(timers, buf);
        self.render_keypad(keypad, buf);
    }
}

fn half_block_lines(frame: &FrameBuffer) -> Vec<Line<'static>> {
    frame
        .pixels()
        .chunks_exact(2)
        .map(|pair| {
            let (upper, lower) = (&pair[0], &pair[1]);
            upper
                .iter()
                .zip(lower)
                .map(|(&top, &bottom)| match (top, bottom) {
                    (true, true) => '█',
                    (true, false) => '▀',
                    (false, true) => '▄',
                    (false, false) => ' ',
                })
                .collect::<String>()
                .into()
        })
        .collect()
}

impl App {
    fn render_state(&self, area: Rect, buf: &mut Buffer) {
        let chip8 = self.runner.chip8_ref();
        let line = match chip8.state() {
            ExecState::Running => Line::from(format!("PC {:03X}", chip8.pc())).green(),
            ExecState::Waiting { x } => Line::from(format!("KEY -> V{x:X}")).yellow(),
            ExecState::Halted => Line::from("HALTED").red(),
        };

        Paragraph::new(line.centered())
            .block(Block::bordered().title(" State "))
            .render(area, buf);
    }

    fn render_timers(&self, area: Rect, buf: &mut Buffer) {
        let chip8 = self.runner.chip8_ref();
        let delay = Line::from(format!("DT {:3}", chip8.delay_timer()));
        let mut sound = Line::from(format!("ST {:3}", chip8.sound_timer()));
        if chip8.should_beep() {
            sound = sound.yellow();
        }

        Paragraph::new(vec![delay, sound])
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Timers "))
            .render(area, buf);
    }

    fn render_keypad(&self, area: Rect, buf: &mut Buffer) {
        let held = self.runner.chip8_ref().keypad();
        let lines: Vec<Line> = KEYPAD_ROWS
            .iter()
            .map(|row| {
                Line::from_iter(row.iter().map(|&key| {
                    let label = Span::raw(format!(" {key:X} "));
                    if held[key] { label.reversed() } else { label }
                }))
            })
            .collect();

        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .block(Block::bordered().title(" Keypad "))
            .render(area, buf);
    }
}

/// Runs a CHIP-8 program in the terminal.
///
/// The 1-4, Q-R, A-F and Z-V block stands in for the hex keypad.
/// Backspace restarts the program, Escape quits.
#[derive(Parser)]
struct Args {
    #[command(flatten)]
    machine: MachineArgs,
}

fn main() -> anyhow::Result<()> {
    // Logging to the terminal would corrupt the UI, so it stays off unless RUST_LOG asks for it
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("off")).init();

    let args = Args::parse();

    let rom = std::fs::read(&args.machine.rom_path).context("Failed to read ROM file")?;
    let mut app = App::new(&args.machine, &rom).context("Failed to initialize application")?;

    let mut terminal = ratatui::init();
    let app_result = app.run(&mut terminal);
    ratatui::restore();

    app_result
}
