// =============================================================================
// SPIR-V SPECIALIZATION - Draw a cube whose fragment shader is specialized
// =============================================================================
//
// The fragment shader either samples a texture or, when specialization
// constant 5 is true, outputs the color held in constants 7/8/9. The
// constants are fixed at pipeline creation from a packed data block.
//
// FLOW:
// 1. Load config.toml + command line
// 2. Window is created when the event loop resumes
// 3. Build the SampleContext (device, pipeline with specialization data, ...)
// 4. Render and present one frame, hold it on screen
// 5. Optionally write the frame to <image_name>.ppm
// 6. Drop everything and exit
//
// =============================================================================

use anyhow::{Context, Result};
use raw_window_handle::{HasDisplayHandle, HasWindowHandle};
use spirv_specialization::capture;
use spirv_specialization::cli::{self, Args};
use spirv_specialization::config::{Config, DebugConfig};
use spirv_specialization::sample::SampleContext;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::time::Duration;
use winit::{
    application::ApplicationHandler,
    event::WindowEvent,
    event_loop::{ActiveEventLoop, EventLoop},
    window::{Window, WindowAttributes},
};

// =============================================================================
// ENTRY POINT
// =============================================================================

fn main() -> Result<()> {
    let args = Args::parse(std::env::args().skip(1))?;
    if args.help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    let (mut config, load_error) = Config::load(&args.config_path);
    if args.save_images {
        config.output.save_images = true;
    }

    init_logging(&config.debug);
    match load_error {
        Some(e) => log::warn!("Failed to load {:?}: {:#}. Using defaults.", args.config_path, e),
        None => log::debug!("Config: {:?}", config),
    }
    for arg in &args.ignored {
        log::warn!("Ignoring unrecognized argument '{}'", arg);
    }
    log::info!("Starting SPIR-V specialization sample");
    log::info!("Window: {}x{}", config.window.width, config.window.height);
    log::info!(
        "Specialization: {:?}, fragment source: {:?}",
        config.specialization.mode,
        config.shaders.fragment_source
    );

    let event_loop = EventLoop::new()?;
    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    match app.error.take() {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

/// Initialize logging with optional file output
fn init_logging(debug: &DebugConfig) {
    use env_logger::{Builder, Target};
    use log::LevelFilter;

    let mut builder = Builder::new();
    builder.filter_level(LevelFilter::Info);
    builder.parse_default_env();

    let mut file_error = None;
    if debug.log_to_file {
        match open_log_file(Path::new(&debug.log_file)) {
            Ok(file) => {
                builder.target(Target::Pipe(Box::new(Tee { file })));
            }
            Err(e) => file_error = Some(e),
        }
    }
    builder.init();

    if let Some(e) = file_error {
        log::warn!("Cannot open log file {:?}: {}", debug.log_file, e);
    }
}

/// Create/clear the log file and stamp it
fn open_log_file(path: &Path) -> io::Result<File> {
    let mut file = OpenOptions::new()
        .create(true)
        .write(true)
        .truncate(true)
        .open(path)?;
    writeln!(file, "=== SPIR-V Specialization Log ===")?;
    writeln!(file, "Started: {:?}", std::time::SystemTime::now())?;
    writeln!(file)?;
    Ok(file)
}

/// Log sink writing every record to stderr and the log file
struct Tee<W> {
    file: W,
}

impl<W: Write> Write for Tee<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        // A closed stderr must not stop the file copy
        let _ = io::stderr().write_all(buf);
        self.file.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        let _ = io::stderr().flush();
        self.file.flush()
    }
}

// =============================================================================
// APPLICATION
// =============================================================================

struct App {
    config: Config,
    done: bool,
    error: Option<anyhow::Error>,
}

impl App {
    fn new(config: Config) -> Self {
        Self {
            config,
            done: false,
            error: None,
        }
    }

    /// Build, draw one frame, hold it, save it. The context is dropped
    /// (and every Vulkan object with it) before this returns.
    fn run_sample(&self, window: &Window) -> Result<()> {
        let display = window.display_handle()
            .context("Window has no display handle")?
            .as_raw();
        let raw_window = window.window_handle()
            .context("Window has no window handle")?
            .as_raw();
        let size = window.inner_size();

        let context = SampleContext::new(&self.config, display, raw_window, size.width, size.height)?;
        log::info!(
            "Fragment constants: ids {:?}",
            context.fragment_constants().ids().collect::<Vec<_>>()
        );

        let frame = context.render_frame(self.config.output.save_images)?;
        if frame.suboptimal {
            log::warn!("Swapchain image {} was suboptimal for the surface", frame.image_index);
        }

        std::thread::sleep(Duration::from_millis(self.config.graphics.present_hold_ms));

        if let Some(pixels) = frame.capture {
            let image = pixels.to_rgb()?;
            capture::save_ppm(&image, &self.config.output.image_name)?;
        }

        drop(context);
        log::info!("Sample finished");
        Ok(())
    }
}

// =============================================================================
// EVENT HANDLING
// =============================================================================

impl ApplicationHandler for App {
    /// Called when the application is ready to create windows.
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.done {
            return;
        }
        self.done = true;

        let window_attributes = WindowAttributes::default()
            .with_title(&self.config.window.title)
            .with_inner_size(winit::dpi::PhysicalSize::new(
                self.config.window.width,
                self.config.window.height,
            ))
            .with_resizable(false);

        let window = match event_loop.create_window(window_attributes) {
            Ok(w) => w,
            Err(e) => {
                log::error!("Failed to create window: {:?}", e);
                self.error = Some(e.into());
                event_loop.exit();
                return;
            }
        };

        if let Err(e) = self.run_sample(&window) {
            log::error!("Sample failed: {:?}", e);
            self.error = Some(e);
        }

        drop(window);
        event_loop.exit();
    }

    fn window_event(
        &mut self,
        event_loop: &ActiveEventLoop,
        _id: winit::window::WindowId,
        event: WindowEvent,
    ) {
        if let WindowEvent::CloseRequested = event {
            log::info!("Close requested, shutting down...");
            event_loop.exit();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_gets_header_then_records() {
        let path = std::env::temp_dir().join(format!("spirv_spec_log_{}.log", std::process::id()));
        let file = open_log_file(&path).unwrap();

        let mut sink = Tee { file };
        writeln!(sink, "[INFO] Presented swapchain image 0").unwrap();
        sink.flush().unwrap();
        drop(sink);

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(text.starts_with("=== SPIR-V Specialization Log ==="));
        assert!(text.ends_with("[INFO] Presented swapchain image 0\n"));
    }

    #[test]
    fn log_file_is_truncated() {
        let path = std::env::temp_dir().join(format!("spirv_spec_trunc_{}.log", std::process::id()));
        std::fs::write(&path, "stale line from last run\n").unwrap();
        drop(open_log_file(&path).unwrap());

        let text = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).unwrap();
        assert!(!text.contains("stale"));
    }

    #[test]
    fn tee_passes_whole_buffer_to_the_file() {
        let mut sink = Tee { file: Vec::new() };
        assert_eq!(sink.write(b"abc").unwrap(), 3);
        assert_eq!(sink.file, b"abc");
    }
}
