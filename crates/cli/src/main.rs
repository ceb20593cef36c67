mod repl;

use clap::{Args, Parser, Subcommand};
use lib::codec;
use lib::config::Config;
use lib::roles::{
    disconnect_quietly, example_resource_params, EdgeClient, ManagementClient, ProtocolTranslator,
    ResourceManager,
};
use lib::rpc::{ClientError, Role};
use repl::ReplCommand;
use serde_json::Value;
use std::fmt::Debug;
use std::future::Future;
use std::path::{Path, PathBuf};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Lines, Stdin};
use tokio::sync::mpsc::UnboundedReceiver;

#[derive(Parser)]
#[command(name = "edge-example")]
#[command(about = "Example clients for the Edge Core JSON-RPC API", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Args, Clone)]
struct ConnectArgs {
    /// Config file path (default: EDGE_CONFIG_PATH or ~/.edge-examples/config.json)
    #[arg(long, short, value_name = "PATH")]
    config: Option<PathBuf>,

    /// Edge Core Unix socket (default: EDGE_SOCKET_PATH or config edge.socketPath)
    #[arg(long, short, value_name = "PATH")]
    socket: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Show version
    Version,

    /// Write the default configuration file if it does not exist.
    Init {
        /// Config file path (default: EDGE_CONFIG_PATH or ~/.edge-examples/config.json)
        #[arg(long, short, value_name = "PATH")]
        config: Option<PathBuf>,
    },

    /// Protocol translator walkthrough: register, add a FOTA-capable device, update and unregister it.
    Pt(ConnectArgs),

    /// Protocol translator walkthrough of the certificate and crypto calls.
    Crypto(ConnectArgs),

    /// Gateway resource manager walkthrough: register, add resources and update a value.
    Grm(ConnectArgs),

    /// Interactive management API prompt.
    Mgmt(ConnectArgs),
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    let result = match cli.command {
        Some(Commands::Version) => {
            println!("edge-example {}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Some(Commands::Init { config }) => run_init(config),
        Some(Commands::Pt(args)) => run_pt(args).await,
        Some(Commands::Crypto(args)) => run_crypto(args).await,
        Some(Commands::Grm(args)) => run_grm(args).await,
        Some(Commands::Mgmt(args)) => run_mgmt(args).await,
        None => {
            println!("Run with --help for usage");
            Ok(())
        }
    };
    if let Err(e) = result {
        log::error!("{:#}", e);
        std::process::exit(1);
    }
}

fn run_init(config_path: Option<PathBuf>) -> anyhow::Result<()> {
    let path = config_path.unwrap_or_else(lib::config::default_config_path);
    if lib::init::init_config(&path)? {
        println!("wrote default configuration to {}", path.display());
    } else {
        println!("configuration already exists at {}", path.display());
    }
    Ok(())
}

fn load(args: &ConnectArgs) -> anyhow::Result<Config> {
    let (mut config, path) = lib::config::load_config(args.config.clone())?;
    log::debug!("loaded config from {}", path.display());
    config.edge.socket_path = match &args.socket {
        Some(socket) => socket.clone(),
        None => lib::config::resolve_socket_path(&config),
    };
    Ok(config)
}

/// Waits for the operator between walkthrough steps.
struct Prompt {
    lines: Lines<BufReader<Stdin>>,
}

impl Prompt {
    fn stdin() -> Self {
        Self {
            lines: BufReader::new(tokio::io::stdin()).lines(),
        }
    }

    async fn hold(&mut self, message: &str) -> anyhow::Result<()> {
        println!("\x1b[33m{}\x1b[0m", message);
        self.lines.next_line().await?;
        Ok(())
    }
}

/// Run the walkthrough steps, then print events until Ctrl+C. Ctrl+C at any point disconnects
/// and exits with status 1; a failed step disconnects and returns the error.
async fn drive<C, E>(
    client: &C,
    steps: impl Future<Output = anyhow::Result<()>>,
    events: &mut UnboundedReceiver<E>,
) -> anyhow::Result<()>
where
    C: EdgeClient,
    E: Debug,
{
    tokio::select! {
        result = steps => {
            if let Err(e) = result {
                if let Err(close) = client.disconnect().await {
                    log::error!("error on closing the Edge Core connection: {}", close);
                }
                return Err(e);
            }
        }
        _ = tokio::signal::ctrl_c() => {
            interrupted(client).await;
            std::process::exit(1);
        }
    }
    println!("Kill the example with Ctrl+C");
    loop {
        tokio::select! {
            event = events.recv() => match event {
                Some(event) => println!("{:?}", event),
                None => {
                    let _ = tokio::signal::ctrl_c().await;
                    interrupted(client).await;
                    std::process::exit(1);
                }
            },
            _ = tokio::signal::ctrl_c() => {
                interrupted(client).await;
                std::process::exit(1);
            }
        }
    }
}

async fn interrupted<C: EdgeClient>(client: &C) {
    disconnect_quietly(client).await;
    log::info!("interrupted");
}

fn show(label: &str, response: &Value) {
    println!("{}: {}", label, response);
}

async fn run_pt(args: ConnectArgs) -> anyhow::Result<()> {
    let config = load(&args)?;
    let device_id = config.translator.device_id.clone();
    let (pt, mut events) = ProtocolTranslator::from_config(&config);
    let mut prompt = Prompt::stdin();
    let steps = async {
        prompt.hold("Press Enter to connect Edge.").await?;
        pt.connect().await?;
        println!("Connected to Edge at {}", pt.rpc().locator().display_url());

        prompt.hold("Press Enter to register as protocol translator.").await?;
        show("Registered as protocol translator. Response", &pt.register().await?);

        prompt.hold("Press Enter to register the example device.").await?;
        show(
            "Registered an example device. Response",
            &pt.register_device(&device_id, "0.0.0").await?,
        );

        prompt.hold("Press Enter to update example device values.").await?;
        show("Updated the resource values. Response", &pt.update_device(&device_id).await?);

        prompt.hold("Press Enter to unregister the example device.").await?;
        show("Example device unregistered. Response", &pt.unregister_device(&device_id).await?);
        anyhow::Ok(())
    };
    drive(&pt, steps, &mut events).await
}

async fn run_crypto(args: ConnectArgs) -> anyhow::Result<()> {
    const KEY: &str = "DLMS";
    const DATA: &[u8] = b"hashdata";

    let config = load(&args)?;
    let (pt, mut events) = ProtocolTranslator::from_config(&config);
    let mut prompt = Prompt::stdin();
    let steps = async {
        prompt.hold("Press Enter to connect Edge.").await?;
        pt.connect().await?;
        println!("Connected to Edge at {}", pt.rpc().locator().display_url());

        prompt.hold("Press Enter to register as protocol translator.").await?;
        show("Registered as protocol translator. Response", &pt.register().await?);

        prompt.hold("Press Enter to get certificate from edge.").await?;
        show("Get certificate response", &pt.get_certificate(KEY).await?);

        prompt.hold("Press Enter to get public key from edge.").await?;
        let response = pt.get_public_key(KEY).await?;
        show("Get public key response", &response);
        let peer_public_key = base64_field(&response, "key_data")?;

        prompt.hold("Press Enter to add certificate to certificate renewal list.").await?;
        show(
            "Added certificate to list. Response",
            &pt.set_certificate_renewal_list(&[KEY]).await?,
        );

        prompt
            .hold("Press Enter to perform certificate renewal. Only works if the DLMS certificate exists in Edge.")
            .await?;
        show("Performed certificate renewal. Response", &pt.renew_certificate(KEY).await?);

        prompt.hold("Press Enter to generate and retrieve a random buffer from edge.").await?;
        show("Generate random response", &pt.generate_random(32).await?);

        prompt.hold("Press Enter to perform asymmetric sign operation on edge.").await?;
        let response = pt.asymmetric_sign(KEY, DATA).await?;
        show("Asymmetric sign response", &response);
        let signature = base64_field(&response, "signature_data")?;

        prompt.hold("Press Enter to perform asymmetric verify operation on edge.").await?;
        show(
            "Asymmetric verify response",
            &pt.asymmetric_verify(KEY, DATA, &signature).await?,
        );

        prompt.hold("Press Enter to perform ECDH key agreement operation on edge.").await?;
        show(
            "ECDH key agreement response",
            &pt.ecdh_key_agreement(KEY, &peer_public_key).await?,
        );
        anyhow::Ok(())
    };
    drive(&pt, steps, &mut events).await
}

fn base64_field(response: &Value, field: &str) -> anyhow::Result<Vec<u8>> {
    let encoded = response
        .get(field)
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow::anyhow!("response has no `{}`", field))?;
    Ok(codec::decode_bytes(encoded)?)
}

async fn run_grm(args: ConnectArgs) -> anyhow::Result<()> {
    let config = load(&args)?;
    let (grm, mut events) = ResourceManager::from_config(&config);
    let mut prompt = Prompt::stdin();
    let steps = async {
        prompt.hold("Press Enter to connect Edge.").await?;
        grm.connect().await?;
        println!("Connected to Edge at {}", grm.rpc().locator().display_url());

        prompt.hold("Press Enter to register as Gateway Resource Manager.").await?;
        show("Registered as Gateway Resource Manager. Response", &grm.register().await?);

        prompt.hold("Press Enter to add the example resources.").await?;
        let params = example_resource_params(grm.name(), 0.0);
        show("Added the example resources. Response", &grm.add_resource(&params).await?);
        println!("Created example resources: /33001/0/0, /33001/0/1");

        prompt.hold("Press Enter to update example resource values.").await?;
        let params = example_resource_params(grm.name(), 1.0);
        show(
            "Updated the resource values. Response",
            &grm.update_resource_value(&params).await?,
        );
        anyhow::Ok(())
    };
    drive(&grm, steps, &mut events).await
}

async fn run_mgmt(args: ConnectArgs) -> anyhow::Result<()> {
    let config = load(&args)?;
    let socket_path = config.edge.socket_path.clone();
    let mgmt = ManagementClient::from_config(&config);
    let mut history = repl::History::open(repl::HISTORY_FILE);
    println!("{}", repl::HELP);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();
    loop {
        stdout.write_all(b"<mgmt>$ ").await?;
        stdout.flush().await?;
        let Some(line) = unless_interrupted(lines.next_line(), tokio::signal::ctrl_c()).await else {
            interrupted(&mgmt).await;
            std::process::exit(1);
        };
        let Some(line) = line? else { break };
        if let Err(e) = history.record(&line) {
            log::warn!("could not save REPL history: {}", e);
        }
        let command = match repl::parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(e) => {
                println!("{}", e);
                continue;
            }
        };
        match command {
            ReplCommand::Help => {
                println!("{}", repl::HELP);
                continue;
            }
            ReplCommand::History => {
                for entry in history.entries() {
                    println!("{}", entry);
                }
                continue;
            }
            ReplCommand::Exit => break,
            _ => {}
        }
        let Some(outcome) =
            unless_interrupted(execute(&mgmt, command, &socket_path), tokio::signal::ctrl_c()).await
        else {
            interrupted(&mgmt).await;
            std::process::exit(1);
        };
        match outcome {
            Ok((label, Value::Null)) => println!("{}", label),
            Ok((label, response)) => println!(
                "{}: {}",
                label,
                serde_json::to_string_pretty(&response).unwrap_or_else(|_| response.to_string())
            ),
            Err(e) => println!("Error: {}", e),
        }
    }
    println!("Exiting...");
    disconnect_quietly(&mgmt).await;
    Ok(())
}

/// `None` when `interrupt` completes before `work`.
async fn unless_interrupted<T>(work: impl Future<Output = T>, interrupt: impl Future) -> Option<T> {
    tokio::select! {
        out = work => Some(out),
        _ = interrupt => None,
    }
}

/// Run one management command. `help`, `history` and `exit` are handled by the loop.
async fn execute(
    mgmt: &ManagementClient,
    command: ReplCommand,
    default_socket: &Path,
) -> Result<(&'static str, Value), ClientError> {
    match command {
        ReplCommand::Connect {
            api_path,
            socket_path,
        } => {
            let api_path = api_path.unwrap_or_else(|| Role::Management.api_path().to_string());
            let socket = socket_path.unwrap_or_else(|| default_socket.to_path_buf());
            mgmt.connect_with(&api_path, &socket)
                .await
                .map(|()| ("Connected to Edge", Value::Null))
        }
        ReplCommand::Devices => mgmt
            .devices()
            .await
            .map(|r| ("Device list query response", r)),
        ReplCommand::ReadResource { endpoint_name, uri } => mgmt
            .read_resource(&endpoint_name, &uri)
            .await
            .map(|r| ("Read resource response", r)),
        ReplCommand::WriteResource {
            endpoint_name,
            uri,
            base64_value,
        } => mgmt
            .write_resource(&endpoint_name, &uri, &base64_value)
            .await
            .map(|r| ("Write resource response", r)),
        ReplCommand::History | ReplCommand::Help | ReplCommand::Exit => Ok(("", Value::Null)),
    }
}
