mod api;
mod app;
mod audio;
mod canvas;
mod config;
mod console;
mod curriculum;
mod state_machine;

use std::io::BufRead;
use std::sync::Arc;
use winit::event_loop::{EventLoop, EventLoopProxy};

use app::AppEvent;

/// Forward parsed console commands to the event loop until stdin closes.
fn spawn_stdin_reader(proxy: EventLoopProxy<AppEvent>) {
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            let Ok(line) = line else {
                break;
            };
            match console::parse(&line) {
                Ok(Some(command)) => {
                    if proxy.send_event(AppEvent::Command(command)).is_err() {
                        return;
                    }
                }
                Ok(None) => {}
                Err(e) => println!("({})", e),
            }
        }
        let _ = proxy.send_event(AppEvent::InputClosed);
    });
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    log::info!("discover-teacher v{}", env!("CARGO_PKG_VERSION"));

    // Gateway calls run on tokio; everything else stays on the event loop
    let tokio_rt = Arc::new(
        tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
            .expect("Failed to create tokio runtime"),
    );

    let event_loop = EventLoop::<AppEvent>::with_user_event()
        .build()
        .expect("Failed to create event loop");

    let proxy = event_loop.create_proxy();
    spawn_stdin_reader(proxy.clone());

    let mut app = app::App::new(tokio_rt, proxy);
    app.greet();

    log::info!("Starting event loop");
    event_loop.run_app(&mut app).expect("Event loop failed");
}
