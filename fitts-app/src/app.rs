use anyhow::{Context, Result, anyhow};
use chrono::{DateTime, Local};
use fitts_experiment::{CsvFileSink, EventOutcome, SessionConfig, SessionEvent, SessionKey, SessionStateMachine};
use fitts_input::{DeviceSink, PointerButton, PointingDevice, RawPointerState};
use fitts_render::{SkiaRenderer, load_font};
use fitts_timing::{FrameLimiter, HighPrecisionTimer, Timer};
use pixels::{Pixels, SurfaceTexture};
use std::sync::Arc;
use winit::{
    application::ApplicationHandler,
    dpi::PhysicalSize,
    event::{DeviceEvent, DeviceId, ElementState, MouseButton, WindowEvent},
    event_loop::{ActiveEventLoop, DeviceEvents, EventLoop},
    keyboard::{KeyCode, PhysicalKey},
    window::{CursorGrabMode, Fullscreen, Window, WindowId},
};

type Session = SessionStateMachine<HighPrecisionTimer, CsvFileSink>;

pub struct App {
    config: SessionConfig,
    timer: HighPrecisionTimer,
    pointer: RawPointerState,
    device: Option<PointingDevice>,
    sink: DeviceSink,
    started_at: DateTime<Local>,

    window: Option<Arc<Window>>,
    pixels: Option<Pixels<'static>>,
    renderer: Option<SkiaRenderer>,
    session: Option<Session>,
    limiter: FrameLimiter,

    scale_factor: f64,
    refresh_rate: Option<f64>,
    fatal: Option<anyhow::Error>,
}

impl App {
    /// Binds the pointing device. Failure here is fatal before any window
    /// is created.
    pub fn new(config: SessionConfig) -> Result<Self> {
        // real bounds are known once the window exists
        let pointer = RawPointerState::new(1, 1);
        let device = PointingDevice::open(&config.device_uri, pointer.clone())
            .with_context(|| format!("binding pointing device {:?}", config.device_uri))?;

        Ok(Self {
            timer: HighPrecisionTimer::new(),
            sink: device.sink(),
            device: Some(device),
            pointer,
            started_at: Local::now(),
            window: None,
            pixels: None,
            renderer: None,
            session: None,
            limiter: FrameLimiter::new(config.frame_rate),
            scale_factor: 1.0,
            refresh_rate: None,
            fatal: None,
            config,
        })
    }

    pub fn run(mut self) -> Result<()> {
        let event_loop = EventLoop::new()?;
        event_loop.listen_device_events(DeviceEvents::Always);

        let result = event_loop.run_app(&mut self);
        self.finish();

        if let Some(err) = self.fatal.take() {
            return Err(err);
        }
        result.map_err(Into::into)
    }

    fn create_window_and_surface(&mut self, event_loop: &ActiveEventLoop) -> Result<()> {
        let primary_monitor = event_loop
            .primary_monitor()
            .or_else(|| event_loop.available_monitors().next())
            .ok_or_else(|| anyhow!("no monitor available"))?;

        self.refresh_rate = primary_monitor
            .refresh_rate_millihertz()
            .map(|rate| rate as f64 / 1000.0);

        let window_attributes = Window::default_attributes()
            .with_title("1D Fitts' Law Experiment")
            .with_fullscreen(Some(Fullscreen::Borderless(Some(primary_monitor))))
            .with_resizable(false);

        let window = Arc::new(event_loop.create_window(window_attributes)?);
        let size = window.inner_size();
        self.scale_factor = window.scale_factor();

        tracing::info!(
            width = size.width,
            height = size.height,
            scale_factor = self.scale_factor,
            refresh_hz = self.refresh_rate.unwrap_or(0.0),
            "display configured"
        );

        let surface_texture = SurfaceTexture::new(size.width, size.height, window.clone());
        self.pixels = Some(Pixels::new(size.width, size.height, surface_texture)?);

        let font = load_font(self.config.font_path.as_deref())?;
        self.renderer = Some(SkiaRenderer::new(size.width, size.height, font)?);

        self.pointer.recenter(size.width, size.height);
        let csv = CsvFileSink::new(&self.config.output_dir, self.started_at);
        tracing::info!(path = %csv.path().display(), "session log");
        self.session = Some(SessionStateMachine::new(
            self.config.clone(),
            self.timer.clone(),
            self.pointer.clone(),
            csv,
        )?);

        window.set_cursor_visible(false);
        if window
            .set_cursor_grab(CursorGrabMode::Confined)
            .or_else(|_| window.set_cursor_grab(CursorGrabMode::Locked))
            .is_err()
        {
            tracing::warn!("could not grab the system cursor");
        }
        window.request_redraw();

        self.window = Some(window);
        Ok(())
    }

    fn render_frame(&mut self) -> Result<()> {
        let (Some(pixels), Some(renderer), Some(session)) = (
            self.pixels.as_mut(),
            self.renderer.as_mut(),
            self.session.as_mut(),
        ) else {
            return Ok(());
        };

        if let Some(device) = &self.device {
            device.idle();
        }
        session.update()?;
        session.log_frame();

        let view = session.view();
        let stats = renderer.render_frame(&view, pixels.frame_mut(), &self.timer)?;
        pixels.render()?;

        let frame = self.limiter.tick(&self.timer);
        tracing::trace!(
            frame_ms = frame.as_secs_f64() * 1e3,
            clear_ms = stats.clear.as_secs_f64() * 1e3,
            draw_ms = stats.draw.as_secs_f64() * 1e3,
            copy_ms = stats.copy.as_secs_f64() * 1e3,
            dirty = stats.dirty_count,
            "frame"
        );

        if let Some(window) = &self.window {
            window.request_redraw();
        }
        Ok(())
    }

    fn dispatch(&mut self, event: SessionEvent, event_loop: &ActiveEventLoop) {
        let Some(session) = self.session.as_mut() else {
            if event == SessionEvent::CloseRequested {
                event_loop.exit();
            }
            return;
        };
        // clicks are hit-tested against the latest device position
        if event == SessionEvent::PrimaryClick {
            if let Some(device) = &self.device {
                device.idle();
            }
        }
        match session.handle_event(event) {
            Ok(EventOutcome::Exit) => self.exit(event_loop),
            Ok(_) => {}
            Err(err) => self.fail(event_loop, anyhow!(err).context("saving session log")),
        }
    }

    fn handle_resize(&mut self, size: PhysicalSize<u32>) -> Result<()> {
        if size.width == 0 || size.height == 0 {
            return Ok(());
        }
        if let Some(pixels) = &mut self.pixels {
            pixels.resize_surface(size.width, size.height)?;
            pixels.resize_buffer(size.width, size.height)?;
        }
        if let Some(renderer) = &mut self.renderer {
            renderer.resize(size.width, size.height)?;
        }
        if let Some(session) = &mut self.session {
            session.resize(size.width, size.height);
        }
        tracing::info!(width = size.width, height = size.height, "display resized");
        Ok(())
    }

    fn exit(&mut self, event_loop: &ActiveEventLoop) {
        if let Some(window) = &self.window {
            window.set_cursor_visible(true);
            let _ = window.set_cursor_grab(CursorGrabMode::None);
        }
        event_loop.exit();
    }

    fn fail(&mut self, event_loop: &ActiveEventLoop, err: anyhow::Error) {
        tracing::error!("{err:#}");
        if self.fatal.is_none() {
            self.fatal = Some(err);
        }
        self.exit(event_loop);
    }

    /// Saves whatever was not saved yet and reports session statistics.
    fn finish(&mut self) {
        if let Some(session) = self.session.as_mut() {
            if let Err(err) = session.shutdown() {
                tracing::error!(%err, "final save failed");
                if self.fatal.is_none() {
                    self.fatal = Some(err.into());
                }
            }
        }

        let stats = self.limiter.calibration_stats();
        tracing::info!(
            frames = self.limiter.frame_count(),
            mean_ms = stats.average_frame_time_ns / 1e6,
            jitter_ms = stats.jitter_ns / 1e6,
            min_ms = stats.min_frame_time_ns / 1e6,
            max_ms = stats.max_frame_time_ns / 1e6,
            fps = stats.effective_fps,
            "frame timing"
        );

        if let Some(device) = self.device.take() {
            tracing::info!(events = device.applied(), "closing pointing device");
            device.close();
        }
    }
}

/// Keyboard bindings of the session.
fn session_key(code: KeyCode) -> Option<SessionKey> {
    match code {
        KeyCode::Escape | KeyCode::KeyQ => Some(SessionKey::Quit),
        KeyCode::KeyS => Some(SessionKey::Save),
        KeyCode::KeyR => Some(SessionKey::Repeat),
        KeyCode::KeyC => Some(SessionKey::Continue),
        _ => None,
    }
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.window.is_none() {
            if let Err(err) = self.create_window_and_surface(event_loop) {
                self.fail(event_loop, err.context("creating window and surface"));
            }
        }
    }

    fn device_event(&mut self, event_loop: &ActiveEventLoop, _id: DeviceId, event: DeviceEvent) {
        let now = self.timer.now();
        let result = match event {
            DeviceEvent::MouseMotion { delta: (dx, dy) } => self.sink.motion(now, dx, dy),
            DeviceEvent::Button { button, state } => self.sink.button(
                now,
                PointerButton::from_raw(button),
                state == ElementState::Pressed,
            ),
            _ => Ok(()),
        };
        if let Err(err) = result {
            self.fail(event_loop, anyhow!(err).context("forwarding device event"));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        match event {
            WindowEvent::CloseRequested => self.dispatch(SessionEvent::CloseRequested, event_loop),
            WindowEvent::RedrawRequested => {
                if let Err(err) = self.render_frame() {
                    self.fail(event_loop, err);
                }
            }
            WindowEvent::KeyboardInput { event, .. } if event.state.is_pressed() && !event.repeat => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    if let Some(key) = session_key(code) {
                        self.dispatch(SessionEvent::Key(key), event_loop);
                    }
                }
            }
            WindowEvent::MouseInput {
                state: ElementState::Pressed,
                button: MouseButton::Left,
                ..
            } => self.dispatch(SessionEvent::PrimaryClick, event_loop),
            WindowEvent::Resized(size) => {
                if let Err(err) = self.handle_resize(size) {
                    self.fail(event_loop, err.context("resizing surface"));
                }
            }
            WindowEvent::ScaleFactorChanged { scale_factor, .. } => {
                self.scale_factor = scale_factor;
                if let Some(size) = self.window.as_ref().map(|w| w.inner_size()) {
                    if let Err(err) = self.handle_resize(size) {
                        self.fail(event_loop, err.context("resizing surface"));
                    }
                }
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_bindings() {
        assert_eq!(session_key(KeyCode::Escape), Some(SessionKey::Quit));
        assert_eq!(session_key(KeyCode::KeyQ), Some(SessionKey::Quit));
        assert_eq!(session_key(KeyCode::KeyS), Some(SessionKey::Save));
        assert_eq!(session_key(KeyCode::KeyR), Some(SessionKey::Repeat));
        assert_eq!(session_key(KeyCode::KeyC), Some(SessionKey::Continue));
        assert_eq!(session_key(KeyCode::Space), None);
    }
}
