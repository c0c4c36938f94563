//! A minimal gateway application: echoes the request method, path, and
//! body back to the client. Run with `cargo run --bin echo-demo` and the
//! `GATEWAY_HTTP_*` environment variables from [`gateway_http::Config::from_env`].

use std::io::Read;
use std::sync::Arc;

use gateway_http::{Body, Config, Environ, GatewayApp, ServerBuilder, StartResponse};

struct Echo;

impl GatewayApp for Echo {
    fn call(
        &self,
        environ: &Environ,
        input: &mut dyn Read,
        start_response: &mut StartResponse,
    ) -> Box<dyn Body> {
        let mut body = Vec::new();
        let _ = input.read_to_end(&mut body);

        let mut response = format!(
            "{} {}{}\n",
            environ.request_method, environ.script_name, environ.path_info
        )
        .into_bytes();
        response.extend_from_slice(&body);

        let headers = vec![
            ("Content-Type".to_string(), "text/plain".to_string()),
            ("Content-Length".to_string(), response.len().to_string()),
        ];
        start_response
            .call(http::StatusCode::OK, headers, false)
            .expect("start_response called twice");

        Box::new(std::iter::once(Ok(bytes::Bytes::from(response))))
    }
}

fn main() {
    env_logger::init();

    let config = Config::from_env();
    let server = ServerBuilder::new(config)
        .app(Arc::new(Echo))
        .start()
        .expect("failed to start server");

    log::info!("echo-demo listening");

    let running = server.clone();
    ctrlc_shutdown(move || running.stop());

    while server.is_running() {
        std::thread::sleep(std::time::Duration::from_millis(200));
    }
}

/// Installs a handler that stops the server on SIGINT, without pulling in
/// a signal-handling crate for a demo binary: a background thread reads
/// one line from stdin and treats EOF/Ctrl-D as "stop", which is enough
/// for interactive use and for the integration tests to shut a server
/// down deterministically.
fn ctrlc_shutdown<F: FnOnce() + Send + 'static>(stop: F) {
    std::thread::spawn(move || {
        let mut line = String::new();
        let _ = std::io::stdin().read_line(&mut line);
        stop();
    });
}
