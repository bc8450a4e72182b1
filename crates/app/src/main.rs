//! vkpresent demo: opens a window and draws a triangle through the
//! presentation core, logging frames per second.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info};
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::window::WindowId;

use vkpresent_core::{FrameTimer, RendererConfig};
use vkpresent_platform::Window;
use vkpresent_renderer::RenderContext;
use vkpresent_rhi::pipeline::{CullMode, FixedFunctionState, PipelineDescription};
use vkpresent_rhi::shader::ShaderStage;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Renderer configuration file (TOML); defaults apply when it is missing
    #[arg(short, long, default_value = "vkpresent.toml")]
    config: PathBuf,

    /// Number of frames that may be in flight at once
    #[arg(short, long)]
    frames_in_flight: Option<usize>,

    /// Prefer MAILBOX/IMMEDIATE presentation over FIFO
    #[arg(long)]
    no_vsync: bool,

    /// Enable the Khronos validation layer
    #[arg(long)]
    validation: bool,
}

impl Args {
    fn apply(&self, config: &mut RendererConfig) {
        if let Some(frames) = self.frames_in_flight {
            config.frames_in_flight = frames;
        }
        if self.no_vsync {
            config.vsync = false;
        }
        if self.validation {
            config.validation = true;
        }
    }
}

fn triangle_pipeline() -> PipelineDescription {
    PipelineDescription::new("triangle")
        .shader("triangle", ShaderStage::Vertex)
        .shader("triangle", ShaderStage::Fragment)
        .fixed_function(FixedFunctionState {
            cull_mode: CullMode::None,
            ..Default::default()
        })
        .record(|cmd, _image_index| cmd.draw(3, 1, 0, 0))
}

fn fps_title(title: &str, fps: f64) -> String {
    format!("{} - {:.0} fps", title, fps)
}

struct App {
    config: RendererConfig,
    window: Option<Window>,
    context: Option<RenderContext>,
    timer: FrameTimer,
}

impl App {
    fn new(config: RendererConfig) -> Self {
        Self {
            config,
            window: None,
            context: None,
            timer: FrameTimer::default(),
        }
    }

    fn init(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let window = Window::new(event_loop, &self.config.window)?;
        let mut context = RenderContext::init(&window, &self.config)?;
        context.add_pipeline(triangle_pipeline())?;

        info!(
            "Initialization complete ({:?}), entering main loop",
            context.current_color_format()?
        );
        self.context = Some(context);
        self.window = Some(window);
        Ok(())
    }

    fn shutdown(&mut self) {
        if let Some(mut context) = self.context.take() {
            if let Err(e) = context.wait_device() {
                error!("Failed to wait for device: {}", e);
            }
            context.cleanup();
        }
        self.window = None;
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_some() {
            return;
        }
        if let Err(e) = self.init(event_loop) {
            error!("Failed to initialize: {:#}", e);
            event_loop.exit();
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => {
                info!("Close requested, shutting down");
                self.shutdown();
                event_loop.exit();
            }
            WindowEvent::Resized(size) => {
                if let Some(window) = &self.window {
                    window.notify_resized(size.width, size.height);
                }
            }
            WindowEvent::RedrawRequested => {
                let (Some(window), Some(context)) = (&self.window, &mut self.context) else {
                    return;
                };
                if let Err(e) = context.draw_frame(window) {
                    error!("Fatal render error: {}", e);
                    self.shutdown();
                    event_loop.exit();
                    return;
                }
                if let Some(fps) = self.timer.tick() {
                    window.set_title(&fps_title(&self.config.window.title, fps));
                    info!(
                        "{:.1} fps ({} frames total)",
                        fps,
                        context.frame_counter()
                    );
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.request_redraw();
        }
    }

    fn exiting(&mut self, _event_loop: &ActiveEventLoop) {
        self.shutdown();
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = RendererConfig::load(&args.config)
        .with_context(|| format!("loading {}", args.config.display()))?;
    args.apply(&mut config);
    config.validate()?;

    vkpresent_core::init_logging(&config.log_filter);
    info!("Starting vkpresent with {:?}", config);

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App::new(config);
    event_loop.run_app(&mut app)?;

    Ok(())
}
