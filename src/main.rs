// =============================================================================
// VULKAN TEXTURED QUAD - spinning, textured rectangle rendered with ash
// =============================================================================
//
// ARCHITECTURE OVERVIEW:
// ┌─────────────────────────────────────────────────────────────────┐
// │  winit event loop (window, input, redraw requests)              │
// │    └── Renderer                                                 │
// │          └── Vulkan Device + Swapchain                          │
// │                └── Pipeline, buffers, texture, descriptors      │
// │                      └── Synchronization (fences, semaphores)   │
// └─────────────────────────────────────────────────────────────────┘
//
// FRAME FLOW:
// 1. Wait for this frame slot's fence
// 2. Acquire swapchain image
// 3. Write the rotation/camera/projection UBO
// 4. Record and submit the draw
// 5. Present rendered image to screen
//
// =============================================================================

mod backend;
mod config;
mod geometry;
mod renderer;

use anyhow::{anyhow, Result};
use config::Config;
use renderer::Renderer;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::sync::Arc;
use std::time::Instant;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{Fullscreen, Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    // Load configuration from config.toml
    let (config, source) = Config::load();

    init_logging(&config);
    source.log();
    log::info!("Starting Vulkan textured quad");
    log::info!("Window: {}x{} ({})",
        config.window.width,
        config.window.height,
        if config.window.fullscreen { "fullscreen" } else { "windowed" }
    );
    log::info!("Present mode: {}", config.graphics.present_mode);

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    // Tear down GPU resources before reporting
    app.renderer = None;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Log lines go to stderr and, when enabled, are mirrored into a log file
struct TeeWriter {
    file: File,
}

impl Write for TeeWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        io::stderr().write_all(buf)?;
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()?;
        self.file.flush()
    }
}

/// Initialize logging with optional file output for validation errors
fn init_logging(config: &Config) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    // RUST_LOG still wins over the default level
    builder.parse_default_env();

    if config.debug.log_to_file {
        match OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&config.debug.log_file)
        {
            Ok(mut file) => {
                let _ = writeln!(file, "=== Vulkan Textured Quad Log ===");
                let _ = writeln!(file, "Started: {:?}", std::time::SystemTime::now());
                let _ = writeln!(file);
                builder.target(Target::Pipe(Box::new(TeeWriter { file })));
            }
            Err(e) => eprintln!("Could not open log file {}: {}", config.debug.log_file, e),
        }
    }

    builder.init();
}

/// Map a key name from config.toml to a physical key code
fn parse_key(name: &str) -> Option<KeyCode> {
    let key = match name.trim().to_ascii_lowercase().as_str() {
        "escape" | "esc" => KeyCode::Escape,
        "space" => KeyCode::Space,
        "enter" | "return" => KeyCode::Enter,
        "tab" => KeyCode::Tab,
        "f1" => KeyCode::F1,
        "f2" => KeyCode::F2,
        "f3" => KeyCode::F3,
        "f4" => KeyCode::F4,
        "f5" => KeyCode::F5,
        "f6" => KeyCode::F6,
        "f7" => KeyCode::F7,
        "f8" => KeyCode::F8,
        "f9" => KeyCode::F9,
        "f10" => KeyCode::F10,
        "f11" => KeyCode::F11,
        "f12" => KeyCode::F12,
        "f" => KeyCode::KeyF,
        "q" => KeyCode::KeyQ,
        _ => return None,
    };
    Some(key)
}

fn key_or_default(name: &str, default: KeyCode) -> KeyCode {
    parse_key(name).unwrap_or_else(|| {
        log::warn!("Unknown key '{}', using {:?}", name, default);
        default
    })
}

// =============================================================================
// APPLICATION STATE
// =============================================================================

struct App {
    config: Config,

    window: Option<Arc<Window>>,
    /// Dropped before the window; see `main`
    renderer: Option<Renderer>,
    is_fullscreen: bool,

    quit_key: KeyCode,
    fullscreen_key: KeyCode,

    /// First fatal error; returned from `main` once the loop exits
    error: Option<anyhow::Error>,

    // FPS tracking
    frame_count: u32,
    last_fps_update: Instant,
    last_frame_time: Instant,
}

impl App {
    fn new(config: Config) -> Self {
        let is_fullscreen = config.window.fullscreen;
        let quit_key = key_or_default(&config.controls.quit_key, KeyCode::Escape);
        let fullscreen_key = key_or_default(&config.controls.fullscreen_key, KeyCode::F11);
        let now = Instant::now();
        Self {
            config,
            window: None,
            renderer: None,
            is_fullscreen,
            quit_key,
            fullscreen_key,
            error: None,
            frame_count: 0,
            last_fps_update: now,
            last_frame_time: now,
        }
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, error: anyhow::Error) {
        log::error!("Fatal: {:?}", error);
        if self.error.is_none() {
            self.error = Some(error);
        }
        event_loop.exit();
    }

    fn framebuffer_size(&self) -> (u32, u32) {
        self.window
            .as_ref()
            .map(|w| {
                let size = w.inner_size();
                (size.width, size.height)
            })
            .unwrap_or((0, 0))
    }

    // =========================================================================
    // FULLSCREEN TOGGLE
    // =========================================================================

    fn toggle_fullscreen(&mut self) {
        if let Some(ref window) = self.window {
            self.is_fullscreen = !self.is_fullscreen;

            if self.is_fullscreen {
                // Borderless on the current monitor
                window.set_fullscreen(Some(Fullscreen::Borderless(None)));
                log::info!("Entered fullscreen mode");
            } else {
                window.set_fullscreen(None);
                log::info!("Exited fullscreen mode");
            }

            if let Some(ref mut renderer) = self.renderer {
                renderer.framebuffer_resized = true;
            }
        }
    }

    // =========================================================================
    // FPS TRACKING
    // =========================================================================

    fn update_fps(&mut self) {
        if !self.config.debug.show_fps {
            return;
        }

        let now = Instant::now();
        let frame_time = now.duration_since(self.last_frame_time).as_secs_f32();
        self.last_frame_time = now;
        self.frame_count += 1;

        // Update title every second
        let elapsed = now.duration_since(self.last_fps_update).as_secs_f32();
        if elapsed >= 1.0 {
            let fps = self.frame_count as f32 / elapsed;

            if let Some(ref window) = self.window {
                window.set_title(&format!(
                    "{} - {:.0} FPS ({:.2}ms)",
                    self.config.window.title,
                    fps,
                    frame_time * 1000.0,
                ));
            }

            self.frame_count = 0;
            self.last_fps_update = now;
        }
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }

        let mut window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ));

        if self.config.window.fullscreen {
            window_attributes = window_attributes.with_fullscreen(Some(Fullscreen::Borderless(None)));
        }

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => Arc::new(w),
            Err(e) => {
                self.fail(event_loop, anyhow!("failed to create window: {}", e));
                return;
            }
        };

        let size = window.inner_size();
        match Renderer::new(&*window, (size.width, size.height), &self.config) {
            Ok(renderer) => self.renderer = Some(renderer),
            Err(e) => {
                self.fail(event_loop, e.context("failed to initialize Vulkan"));
                return;
            }
        }

        self.window = Some(window);
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        match event {
            WindowEvent::CloseRequested => {
                log::info!("Close requested, shutting down...");
                if let Some(ref renderer) = self.renderer {
                    let _ = renderer.wait_idle();
                }
                event_loop.exit();
            }

            WindowEvent::Resized(size) => {
                log::debug!("Window resized to {}x{}", size.width, size.height);
                if let Some(ref mut renderer) = self.renderer {
                    renderer.framebuffer_resized = true;
                }
            }

            WindowEvent::RedrawRequested => {
                let size = self.framebuffer_size();
                let Some(ref mut renderer) = self.renderer else {
                    return;
                };

                match renderer.draw_frame(size) {
                    Ok(true) => self.update_fps(),
                    Ok(false) => {}
                    Err(e) => self.fail(event_loop, e.context("failed to draw frame")),
                }
            }

            WindowEvent::KeyboardInput { event, .. } => {
                if !event.state.is_pressed() || event.repeat {
                    return;
                }
                if let PhysicalKey::Code(key) = event.physical_key {
                    if key == self.quit_key {
                        log::info!("{:?} pressed, exiting...", key);
                        event_loop.exit();
                    } else if key == self.fullscreen_key {
                        self.toggle_fullscreen();
                    }
                }
            }

            _ => {}
        }
    }

    /// Request continuous redraws while the event loop is idle
    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(ref window) = self.window {
            window.request_redraw();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_default_keys() {
        assert_eq!(parse_key("Escape"), Some(KeyCode::Escape));
        assert_eq!(parse_key("F11"), Some(KeyCode::F11));
    }

    #[test]
    fn test_parse_key_is_case_insensitive() {
        assert_eq!(parse_key("esc"), Some(KeyCode::Escape));
        assert_eq!(parse_key(" f5 "), Some(KeyCode::F5));
        assert_eq!(parse_key("Q"), Some(KeyCode::KeyQ));
    }

    #[test]
    fn test_parse_unknown_key() {
        assert_eq!(parse_key("Hyper"), None);
        assert_eq!(key_or_default("Hyper", KeyCode::F11), KeyCode::F11);
    }

    #[test]
    fn test_tee_writer_writes_file() {
        let path = std::env::temp_dir().join(format!("tee_writer_{}.log", std::process::id()));
        let file = File::create(&path).unwrap();
        let mut writer = TeeWriter { file };
        writer.write_all(b"hello\n").unwrap();
        writer.flush().unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents, "hello\n");
        let _ = std::fs::remove_file(&path);
    }
}
