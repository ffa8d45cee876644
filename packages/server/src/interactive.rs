//! Interactive mode for the server.
//!
//! Prompts for the bind address, port, and static directory before
//! starting the server.

use dialoguer::{Confirm, Input};

/// Runs the server in interactive mode, prompting for configuration.
///
/// Sets `BIND_ADDR`, `PORT`, and `STATIC_DIR` from the answers and
/// delegates to [`super::run_server`].
///
/// # Errors
///
/// Returns an `std::io::Result` error if the underlying server fails to
/// start.
#[allow(clippy::future_not_send)]
pub async fn run() -> std::io::Result<()> {
    println!("Canvass Map Server");
    println!();

    let bind_addr = prompt("Bind address", "127.0.0.1");

    let port = loop {
        let raw = prompt("Port", "8080");
        if raw.parse::<u16>().is_ok() {
            break raw;
        }
        println!("Not a valid port: {raw}");
    };

    let static_dir = prompt("Frontend directory", super::DEFAULT_STATIC_DIR);

    // SAFETY: Single-threaded at this point; these are read once during
    // server initialisation.
    unsafe {
        std::env::set_var("BIND_ADDR", &bind_addr);
        std::env::set_var("PORT", &port);
        std::env::set_var("STATIC_DIR", &static_dir);
    }

    if !Confirm::new()
        .with_prompt(format!("Start server on {bind_addr}:{port}?"))
        .default(true)
        .interact()
        .unwrap_or(true)
    {
        println!("Cancelled.");
        return Ok(());
    }

    super::run_server().await
}

fn prompt(label: &str, default: &str) -> String {
    Input::new()
        .with_prompt(label)
        .default(default.to_string())
        .interact_text()
        .unwrap_or_else(|_| default.to_string())
}
