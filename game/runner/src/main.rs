use clap::Parser;
use flare::logging;
use hadron::net::endpoint::EndpointConfig;
use hadron::net::transport::ServerTransport;
use novacore::admin::AdminConsole;
use novacore::config::GameConfig;
use novacore::server::Server;
use std::path::PathBuf;
use std::process;
use std::sync::atomic::Ordering;

/// Authoritative game server for the Nova arcade shooters.
#[derive(Parser)]
#[command(name = "novaserver")]
struct Args {
    /// Reliable channel port; the unreliable port is taken from the config.
    port: Option<u16>,

    /// Path to a TOML configuration file.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Bind to all interfaces instead of loopback.
    #[arg(long)]
    bind_all: bool,
}

fn main() {
    let args = Args::parse();

    let mut config = match args.config {
        Some(path) => GameConfig::load(path),
        None => GameConfig::default(),
    };

    config.apply_env();

    if let Some(port) = args.port {
        config.server.tcp_port = port;
    }
    if args.bind_all {
        config.server.bind_all = true;
    }

    let log = logging::terminal(logging::severity(&config.log.level));

    let endpoint_config = EndpointConfig {
        tcp_addr: config.tcp_addr(),
        udp_addr: config.udp_addr(),
        max_peers: config.server.max_clients as usize,
    };

    let transport = match ServerTransport::start(endpoint_config, &log) {
        Ok(transport) => transport,
        Err(err) => {
            logging::crit!(log, "failed to start the transport";
                           "context" => "main",
                           "error" => ?err);
            process::exit(1);
        }
    };

    let console = AdminConsole::spawn_stdin();
    let mut server = Server::new(config, transport, Some(console), &log);

    let running = server.stop_handle();
    if let Err(err) = ctrlc::set_handler(move || {
        running.store(false, Ordering::SeqCst);
    }) {
        logging::crit!(log, "failed to install the signal handler";
                       "context" => "main",
                       "error" => ?err);
        process::exit(1);
    }

    server.run();

    logging::info!(log, "clean shutdown"; "context" => "main");
}
