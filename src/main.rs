use chord_ring::config::{NodeArgs, RingConfig};
use chord_ring::lifecycle::{create_standalone_ring, join_existing_ring};
use chord_ring::ring::peer::{Directory, PeerConnector};
use chord_ring::server;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        // .with_max_level(tracing::Level::DEBUG)
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();
    let node_args = match NodeArgs::parse(&args) {
        Ok(parsed) => parsed,
        Err(e) => {
            eprintln!("{}", e);
            eprintln!("Usage: {} {}", args[0], NodeArgs::USAGE);
            eprintln!("Example: {} --name A --bind 127.0.0.1:1099", args[0]);
            eprintln!(
                "Example: {} --name B --bind 127.0.0.1:1100 --join A@127.0.0.1:1099",
                args[0]
            );
            std::process::exit(1);
        }
    };
    let config = RingConfig::from_env()?;

    // 1. Listener first, so the advertised address is the bound one:
    let listener = tokio::net::TcpListener::bind(node_args.bind).await?;
    let local_addr = listener.local_addr()?;
    tracing::info!("Starting member {} on {}", node_args.name, local_addr);

    let directory = Directory::new();
    let connector = PeerConnector::new(local_addr, directory.clone(), config);

    // 2. Serve before joining: the contact calls back into this member while
    //    splicing it in.
    let (stop_tx, stop_rx) = tokio::sync::oneshot::channel::<()>();
    let server_task = tokio::spawn(server::serve(listener, directory.clone(), async move {
        let _ = stop_rx.await;
    }));

    // 3. Ring membership:
    let member = match &node_args.contact {
        Some(contact) => {
            tracing::info!("Joining ring via {}@{}", contact.name, contact.addr);
            join_existing_ring(
                &node_args.name,
                connector.clone(),
                &contact.name,
                &contact.addr.ip().to_string(),
                contact.addr.port(),
            )
            .await?
        }
        None => {
            tracing::info!("Starting a new ring");
            create_standalone_ring(&node_args.name, connector.clone())?
        }
    };

    tracing::info!("Press Ctrl+C to leave the ring and shut down");
    tokio::signal::ctrl_c().await?;

    // 4. Orderly shutdown:
    if let Err(e) = member.leave().await {
        tracing::error!("Leaving the ring failed: {}", e);
    }
    let _ = stop_tx.send(());
    server_task.await??;

    Ok(())
}
