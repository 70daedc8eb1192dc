use std::{sync::Arc, time::Instant};

use anyhow::Context;
use clap::Parser;
use log::{error, info, warn};
use pixels::{Pixels, SurfaceTexture};
use rodio::{OutputStream, OutputStreamBuilder, Sink, Source, source::SquareWave};
use winit::{
    application::ApplicationHandler,
    dpi::LogicalSize,
    event::{ElementState, KeyEvent, WindowEvent},
    event_loop::{ActiveEventLoop, ControlFlow, EventLoop},
    keyboard::{Key, KeyCode, NamedKey, PhysicalKey},
    window::{Window, WindowId},
};

use chip8_vm::{
    cli::{KEYPAD_ROWS, MachineArgs, describe_error},
    emu::{Chip8Error, Chip8Runner, DISPLAY_X, DISPLAY_Y, Display, FrameBuffer},
    u4,
};

const WINDOW_TITLE: &str = "chip8-vm";
const WINDOW_SCALE: u32 = 10;

/// Physical key positions, laid out in the same grid as [`KEYPAD_ROWS`].
const KEYBOARD: [[KeyCode; 4]; 4] = [
    [KeyCode::Digit1, KeyCode::Digit2, KeyCode::Digit3, KeyCode::Digit4],
    [KeyCode::KeyQ, KeyCode::KeyW, KeyCode::KeyE, KeyCode::KeyR],
    [KeyCode::KeyA, KeyCode::KeyS, KeyCode::KeyD, KeyCode::KeyF],
    [KeyCode::KeyZ, KeyCode::KeyX, KeyCode::KeyC, KeyCode::KeyV],
];

fn keypad_key(code: PhysicalKey) -> Option<u4> {
    KEYBOARD.iter().zip(&KEYPAD_ROWS).find_map(|(codes, keys)| {
        codes
            .iter()
            .position(|&k| PhysicalKey::Code(k) == code)
            .map(|col| keys[col])
    })
}

/// Per-pixel brightness that fades out after a pixel is cleared, like a CRT.
struct Phosphor {
    brightness: Display<f32>,
}

impl Phosphor {
    /// Brightness lost per second once a pixel goes dark.
    const DECAY_PER_SEC: f32 = 10.0;

    fn new() -> Self {
        Self {
            brightness: [[0.0; DISPLAY_X]; DISPLAY_Y],
        }
    }

    fn update(&mut self, frame: &FrameBuffer, dt: f32) {
        for (levels, lit) in self.brightness.iter_mut().zip(frame.pixels()) {
            for (level, &on) in levels.iter_mut().zip(lit) {
                *level = if on {
                    1.0
                } else {
                    (*level - Self::DECAY_PER_SEC * dt).max(0.0)
                };
            }
        }
    }

    /// Writes green RGBA texels, alpha carrying the brightness.
    fn write_rgba(&self, texels: &mut [u8]) {
        for (texel, level) in texels.chunks_exact_mut(4).zip(self.brightness.iter().flatten()) {
            texel.copy_from_slice(&[0, 0xff, 0, (level * 255.0) as u8]);
        }
    }
}

struct App {
    pixels: Option<Pixels<'static>>,
    window: Option<Arc<Window>>,
    phosphor: Phosphor,

    /// Audio output stream (must be kept alive).
    _audio_stream: OutputStream,
    audio_sink: Sink,

    runner: Chip8Runner,
    /// Used for delta time calculation.
    last_frame_instant: Instant,

    /// Stores the result of the application to be returned from main.
    exit_result: anyhow::Result<()>,
}

impl App {
    fn new(args: &MachineArgs, rom: &[u8]) -> anyhow::Result<Self> {
        // Initialize audio
        let mut _audio_stream = OutputStreamBuilder::open_default_stream()
            .context("Failed to open audio output stream")?;
        _audio_stream.log_on_drop(false);

        let audio_sink = Sink::connect_new(_audio_stream.mixer());
        audio_sink.pause();
        audio_sink.append(SquareWave::new(440.0).amplify(0.5));

        let runner = args
            .build_runner(rom)
            .context("Failed to load ROM into CHIP-8 memory")?;
        info!(
            "Loaded {} ({} bytes) at {} Hz",
            args.rom_path.display(),
            rom.len(),
            runner.config().cpu_hz
        );

        Ok(Self {
            pixels: None,
            window: None,
            phosphor: Phosphor::new(),

            _audio_stream,
            audio_sink,

            runner,
            last_frame_instant: Instant::now(),
            exit_result: Ok(()),
        })
    }

    fn present(&mut self, dt: f32) -> anyhow::Result<()> {
        self.phosphor.update(self.runner.display(), dt);

        let pixels = self
            .pixels
            .as_mut()
            .context("Pixels surface not initialized")?;
        self.phosphor.write_rgba(pixels.frame_mut());
        pixels.render().context("Pixels render error")
    }

    fn set_title(&self, status: Option<&str>) {
        if let Some(window) = &self.window {
            match status {
                Some(status) => window.set_title(&format!("{WINDOW_TITLE} - {status}")),
                None => window.set_title(WINDOW_TITLE),
            }
        }
    }

    fn report(&self, e: &Chip8Error) {
        if e.is_fatal() {
            error!("Machine halted: {e}");
        } else {
            warn!("{e}");
        }
        self.set_title(Some(&describe_error(e)));
    }

    fn restart(&mut self) {
        match self.runner.restart() {
            Ok(()) => {
                self.phosphor = Phosphor::new();
                self.set_title(None);
                info!("Restarted");
            }
            Err(e) => self.report(&e),
        }
    }

    fn try_resumed(&mut self, event_loop: &ActiveEventLoop) -> anyhow::Result<()> {
        let (width, height) = (DISPLAY_X as u32, DISPLAY_Y as u32);
        let attributes = Window::default_attributes()
            .with_title(WINDOW_TITLE)
            .with_inner_size(LogicalSize::new(width * WINDOW_SCALE, height * WINDOW_SCALE))
            .with_min_inner_size(LogicalSize::new(width, height));
        let window = Arc::new(
            event_loop
                .create_window(attributes)
                .context("Failed to create window")?,
        );

        let size = window.inner_size();
        let surface = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(
            Pixels::new(width, height, surface).context("Failed to create pixels surface")?,
        );

        window.request_redraw();
        self.window = Some(window);
        // The window may take a while to appear; don't run that time as one frame
        self.last_frame_instant = Instant::now();
        Ok(())
    }

    fn try_window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        event: WindowEvent,
    ) -> anyhow::Result<()> {
        match event {
            WindowEvent::CloseRequested
            | WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        logical_key: Key::Named(NamedKey::Escape),
                        ..
                    },
                ..
            } => {
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                self.pixels
                    .as_mut()
                    .context("Pixels surface not initialized")?
                    .resize_surface(size.width, size.height)
                    .context("Failed to resize pixels surface")?;
            }

            WindowEvent::RedrawRequested => {
                let now = Instant::now();
                let dt = (now - self.last_frame_instant).as_secs_f32();
                self.last_frame_instant = now;

                // A halted machine keeps its window so it can be restarted
                if let Err(e) = self.runner.update(dt) {
                    self.report(&e);
                }

                if self.runner.should_beep() {
                    self.audio_sink.play();
                } else {
                    self.audio_sink.pause();
                }

                self.present(dt)?;

                if let Some(window) = &self.window {
                    window.request_redraw();
                }
            }

            WindowEvent::KeyboardInput {
                event:
                    KeyEvent {
                        physical_key: PhysicalKey::Code(KeyCode::Backspace),
                        state: ElementState::Pressed,
                        repeat: false,
                        ..
                    },
                ..
            } => {
                self.restart();
            }

            WindowEvent::KeyboardInput { event, .. } if !event.repeat => {
                if let Some(key) = keypad_key(event.physical_key) {
                    self.runner.set_key(key, event.state == ElementState::Pressed);
                }
            }

            _ => (),
        }
        Ok(())
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if let Err(e) = self.try_resumed(event_loop) {
            self.exit_result = Err(e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        if let Err(e) = self.try_window_event(event_loop, event) {
            self.exit_result = Err(e);
            event_loop.exit();
        }
    }
}

/// Runs a CHIP-8 program in a window.
///
/// The 1-4, Q-R, A-F and Z-V block stands in for the hex keypad.
/// Backspace restarts the program, Escape quits.
#[derive(Parser, Debug)]
#[command(about)]
struct Args {
    #[command(flatten)]
    machine: MachineArgs,
}

fn main() -> anyhow::Result<()> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let args = Args::parse();

    let rom = std::fs::read(&args.machine.rom_path).context("Failed to read ROM file")?;

    let event_loop = EventLoop::new().context("Failed to create event loop")?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(&args.machine, &rom).context("Failed to initialize application")?;
    event_loop
        .run_app(&mut app)
        .context("Error occurred during event loop execution")?;

    // Return the result captured during the event loop
    app.exit_result
}
