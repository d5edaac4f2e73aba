/// Terminal front-end for the face mask renderer
use crossterm::{
    cursor,
    event::{self, Event, KeyCode, KeyEvent, KeyEventKind},
    execute, queue,
    style::{Color, Print, ResetColor, SetForegroundColor},
    terminal::{self, ClearType},
};
use image::{Rgb, RgbImage};
use mask_core::detect::DetectorThread;
use mask_core::{Command, MaskSession, Result};
use std::io::{stdout, Write};
use std::time::{Duration, Instant};

pub mod renderer;
pub mod source;

pub use renderer::HalfBlockRenderer;
pub use source::FrameSource;

/// Map a key to a session command
pub fn command_for(code: KeyCode) -> Option<Command> {
    match code {
        KeyCode::Char('b') => Some(Command::ToggleBackground),
        KeyCode::Char('c') => Some(Command::CycleColor),
        KeyCode::Char(d @ '1'..='6') => Some(Command::SelectColor(d as usize - '1' as usize)),
        KeyCode::Char('t') => Some(Command::ToggleTexture),
        KeyCode::Char('l') => Some(Command::ToggleLandmarks),
        KeyCode::Char('f') => Some(Command::ToggleFollow),
        KeyCode::Char('m') => Some(Command::CycleShading),
        KeyCode::Char('e') => Some(Command::Export),
        KeyCode::Char('r') => Some(Command::ToggleRecording),
        KeyCode::Char('q') | KeyCode::Esc => Some(Command::Quit),
        _ => None,
    }
}

/// Vertical gradient shown when no background image is given
pub fn backdrop(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |_, y| {
        let t = y as f32 / height.max(1) as f32;
        let mix = |top: f32, bottom: f32| (top + (bottom - top) * t) as u8;
        Rgb([mix(70.0, 20.0), mix(80.0, 24.0), mix(96.0, 30.0)])
    })
}

/// Main application struct for terminal mask rendering
pub struct TerminalApp {
    session: MaskSession,
    detector: DetectorThread<FrameSource>,
    source_name: &'static str,
    background: RgbImage,
    renderer: HalfBlockRenderer,
    running: bool,
    started: Instant,
    last_fps_sample: Instant,
    frame_count: u32,
    fps: f32,
    status: String,
}

impl TerminalApp {
    pub fn new(session: MaskSession, source: FrameSource, background: Option<RgbImage>) -> Result<Self> {
        let (columns, rows) = terminal::size()?;
        let render = &session.config().render;
        let background = background.unwrap_or_else(|| backdrop(render.width, render.height));
        let source_name = source.name();

        Ok(Self {
            detector: DetectorThread::spawn(source)?,
            source_name,
            background,
            // Last row holds the status line
            renderer: HalfBlockRenderer::new(columns, rows.saturating_sub(1)),
            running: true,
            started: Instant::now(),
            last_fps_sample: Instant::now(),
            frame_count: 0,
            fps: 0.0,
            status: String::from("ready"),
            session,
        })
    }

    pub fn run(&mut self) -> Result<()> {
        terminal::enable_raw_mode()?;
        execute!(stdout(), terminal::EnterAlternateScreen, cursor::Hide)?;

        let result = self.main_loop();

        // Cleanup
        terminal::disable_raw_mode()?;
        execute!(stdout(), terminal::LeaveAlternateScreen, cursor::Show)?;

        let stats = self.session.stats();
        log::info!(
            "Session ended: {} rendered, {} skipped, {} without face, {} dropped",
            stats.rendered,
            stats.skipped,
            stats.no_face,
            stats.dropped
        );
        result
    }

    fn main_loop(&mut self) -> Result<()> {
        let fps = self.session.config().render.target_fps.max(1);
        let target_frame_time = Duration::from_millis(1000 / fps as u64);

        while self.running {
            let frame_start = Instant::now();

            // Commands are applied between frames only
            while event::poll(Duration::from_millis(0))? {
                self.handle_event(event::read()?);
            }
            if !self.running {
                break;
            }

            self.update()?;
            self.render()?;

            // Frame timing
            self.frame_count += 1;
            let elapsed = frame_start.elapsed();
            if elapsed < target_frame_time {
                std::thread::sleep(target_frame_time - elapsed);
            }

            // Update FPS counter
            let now = Instant::now();
            if (now - self.last_fps_sample).as_secs() >= 1 {
                self.fps = self.frame_count as f32 / (now - self.last_fps_sample).as_secs_f32();
                self.frame_count = 0;
                self.last_fps_sample = now;
            }
        }

        self.detector.stop();
        Ok(())
    }

    fn handle_event(&mut self, event: Event) {
        match event {
            Event::Key(KeyEvent { code, kind, .. }) if kind != KeyEventKind::Release => {
                if let Some(command) = command_for(code) {
                    self.handle_command(command);
                }
            }
            Event::Resize(columns, rows) => {
                self.renderer.resize(columns, rows.saturating_sub(1));
            }
            _ => {}
        }
    }

    fn handle_command(&mut self, command: Command) {
        if command == Command::Quit {
            self.running = false;
            return;
        }

        match self.session.apply(command) {
            Ok(()) => {
                self.status = match command {
                    Command::Export => match self.session.last_export() {
                        Some(path) => format!("exported {}", path.display()),
                        None => "exported".to_string(),
                    },
                    Command::ToggleRecording if self.session.is_recording() => "recording".to_string(),
                    Command::ToggleRecording => "recording stopped".to_string(),
                    other => format!("{:?}", other),
                };
            }
            Err(e) => self.status = e.to_string(),
        }
    }

    fn update(&mut self) -> Result<()> {
        let now_ms = self.started.elapsed().as_millis() as u64;
        self.detector.submit(now_ms);

        // Keep the last output until the detector has something new
        let Some(detection) = self.detector.poll() else {
            return Ok(());
        };
        self.session.set_dropped(self.detector.dropped());

        match self.session.process_frame(detection.as_ref(), Some(&self.background)) {
            Ok(()) => Ok(()),
            Err(e) if e.is_per_frame() => {
                self.status = e.to_string();
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    fn render(&mut self) -> Result<()> {
        let mut stdout = stdout();
        queue!(stdout, cursor::MoveTo(0, 0))?;

        self.renderer.draw(&mut stdout, self.session.frame())?;

        // Draw UI overlay
        let settings = self.session.settings();
        let stats = self.session.stats();
        let (_, rows) = terminal::size()?;
        queue!(
            stdout,
            cursor::MoveTo(0, rows.saturating_sub(1)),
            terminal::Clear(ClearType::CurrentLine),
            SetForegroundColor(Color::Yellow),
            Print(format!(
                "FaceMask | {} | FPS: {:.1} | {} | follow: {} | {} | skipped: {} | {} | b c 1-6 t l f m e r q",
                self.source_name,
                self.fps,
                settings.shading.name(),
                if settings.follow { "on" } else { "off" },
                if self.session.is_recording() { "REC" } else { "-" },
                stats.skipped,
                self.status
            )),
            ResetColor
        )?;

        stdout.flush()?;
        Ok(())
    }
}
