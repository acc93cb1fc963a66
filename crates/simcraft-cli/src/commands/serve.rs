/// Serve a model over HTTP/WebSocket.
pub fn run(path: &str, host: &str, port: u16) {
    let sim = super::load_simulation(path);
    println!("Serving {path} on http://{host}:{port}");
    println!("  POST /api/v1/message — one protocol request per call");
    println!("  GET  /ws             — message-based connection with stateUpdate pushes");

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(runtime) => runtime,
        Err(err) => {
            eprintln!("error: cannot start async runtime: {err}");
            std::process::exit(1);
        }
    };
    runtime.block_on(simcraft_server::run_server(sim, host, port));
}
