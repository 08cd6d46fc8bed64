mod window;

use winit::event_loop::{ControlFlow, EventLoop};

use windflow::error::AppError;

fn main() -> Result<(), AppError> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let event_loop = EventLoop::new()?;
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = window::App::new();
    event_loop.run_app(&mut app)?;
    app.into_result()
}
