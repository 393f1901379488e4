use std::{path::PathBuf, process::ExitCode, time::Duration};

use clap::{Args, Parser, Subcommand};
use technitium_ctl::{
    AppError, ConnectionConfig, DnsApi, Reconciler, Resource, State, TechnitiumClient,
    config::{DEFAULT_API_PORT, DEFAULT_TIMEOUT_SECS},
    input,
    output::{render_error, render_outcome, render_planned_call, render_response},
    reconcile::{Desired, masked},
    resources::{
        App, ClusterNode, ClusterRole, DhcpScope, FilterList, FilterZone, Group, Permission,
        PrivateKey, Record, ServerSettings, Session, User, Zone,
    },
    technitium::ApiCall,
};
use tracing::info;

#[derive(Parser, Debug)]
#[command(author, version, about, rename_all = "kebab-case")]
struct Cli {
    #[command(flatten)]
    connection: ConnectionArgs,
    /// Report what would change without changing anything
    #[arg(long, global = true)]
    check: bool,
    /// Print the outcome as JSON
    #[arg(long, global = true)]
    json: bool,
    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Debug)]
struct ConnectionArgs {
    /// Technitium server URL without port (e.g. http://127.0.0.1)
    #[arg(long, value_name = "URL", env = "TECHNITIUM_API_URL", global = true)]
    api_url: Option<String>,
    /// Technitium web service port
    #[arg(long, value_name = "PORT", env = "TECHNITIUM_API_PORT", default_value_t = DEFAULT_API_PORT, global = true)]
    api_port: u16,
    /// API token
    #[arg(long, value_name = "TOKEN", env = "TECHNITIUM_API_TOKEN", hide_env_values = true, global = true)]
    api_token: Option<String>,
    /// Accept invalid TLS certificates
    #[arg(long, env = "TECHNITIUM_NO_VALIDATE_CERTS", global = true)]
    no_validate_certs: bool,
    /// Request timeout in seconds
    #[arg(long, value_name = "SECS", env = "TECHNITIUM_TIMEOUT", default_value_t = DEFAULT_TIMEOUT_SECS, global = true)]
    timeout: u64,
}

impl ConnectionArgs {
    fn to_config(&self) -> Result<ConnectionConfig, AppError> {
        let api_url = self
            .api_url
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| AppError::validation("--api-url (or TECHNITIUM_API_URL) is required"))?;
        let api_token = self
            .api_token
            .as_deref()
            .filter(|s| !s.trim().is_empty())
            .ok_or_else(|| {
                AppError::validation("--api-token (or TECHNITIUM_API_TOKEN) is required")
            })?;
        let mut config = ConnectionConfig::new(api_url, api_token);
        config.api_port = self.api_port;
        config.validate_certs = !self.no_validate_certs;
        config.timeout = Duration::from_secs(self.timeout);
        Ok(config)
    }
}

#[derive(Args, Debug)]
struct StateArgs {
    /// Whether the object should exist
    #[arg(long, value_enum, default_value_t = State::Present)]
    state: State,
}

#[derive(Args, Debug)]
struct DesiredArgs {
    #[command(flatten)]
    state: StateArgs,
    /// Desired parameter (repeat for multiple values). JSON arrays, objects and
    /// true/false are parsed, anything else is taken as text
    #[arg(short = 's', long = "set", value_name = "KEY=VALUE")]
    set: Vec<String>,
    /// JSON or YAML mapping of desired parameters
    #[arg(long, value_name = "PATH")]
    from_file: Option<PathBuf>,
}

impl DesiredArgs {
    fn desired(&self) -> Result<Desired, AppError> {
        input::build_desired(self.from_file.as_deref(), &self.set)
            .map_err(|e| AppError::validation(format!("{e:#}")))
    }
}

#[derive(Subcommand, Debug)]
#[command(rename_all = "kebab-case")]
enum Command {
    /// DNS record in a zone
    Record {
        #[arg(long, value_name = "ZONE")]
        zone: String,
        /// Record owner name, `@` for the zone apex
        #[arg(long, value_name = "FQDN")]
        name: String,
        #[arg(long = "type", value_name = "TYPE")]
        rtype: String,
        #[command(flatten)]
        desired: DesiredArgs,
    },
    /// Authoritative zone and its options
    Zone {
        #[arg(long, value_name = "ZONE")]
        zone: String,
        /// Cluster node to act on
        #[arg(long, value_name = "NODE")]
        node: Option<String>,
        #[command(flatten)]
        desired: DesiredArgs,
    },
    /// DHCP scope
    DhcpScope {
        #[arg(long, value_name = "NAME")]
        name: String,
        #[command(flatten)]
        desired: DesiredArgs,
    },
    /// Administrative user
    User {
        #[arg(long, value_name = "USER")]
        username: String,
        #[command(flatten)]
        desired: DesiredArgs,
    },
    /// Administrative group
    Group {
        #[arg(long, value_name = "GROUP")]
        name: String,
        #[command(flatten)]
        desired: DesiredArgs,
    },
    /// Permissions of a web console section
    Permission {
        #[arg(long, value_name = "SECTION")]
        section: String,
        #[command(flatten)]
        desired: DesiredArgs,
    },
    /// Named API token of a user
    Session {
        #[arg(long, value_name = "USER")]
        username: String,
        #[arg(long, value_name = "NAME")]
        token_name: String,
        /// Print a newly created token instead of hiding it
        #[arg(long)]
        show_token: bool,
        #[command(flatten)]
        state: StateArgs,
    },
    /// Server-wide settings
    Settings {
        #[command(flatten)]
        desired: DesiredArgs,
    },
    /// Cluster membership of this node
    Cluster {
        #[arg(long, value_enum)]
        role: ClusterRole,
        #[arg(long, value_name = "NODE")]
        node: Option<String>,
        /// Force promote, leave, or delete even if other nodes are unreachable
        #[arg(long)]
        force: bool,
        #[command(flatten)]
        desired: DesiredArgs,
    },
    /// Installed DNS app
    App {
        #[arg(long, value_name = "NAME")]
        name: String,
        #[command(flatten)]
        desired: DesiredArgs,
    },
    /// DNSSEC private key of a signed zone
    PrivateKey {
        #[arg(long, value_name = "ZONE")]
        zone: String,
        /// KeySigningKey or ZoneSigningKey
        #[arg(long, value_name = "TYPE")]
        key_type: String,
        #[arg(long, value_name = "TAG")]
        key_tag: Option<i64>,
        #[arg(long, value_name = "NODE")]
        node: Option<String>,
        #[command(flatten)]
        desired: DesiredArgs,
    },
    /// Domain on the allow list
    AllowedZone {
        #[arg(long, value_name = "DOMAIN")]
        domain: String,
        #[command(flatten)]
        state: StateArgs,
    },
    /// Domain on the block list
    BlockedZone {
        #[arg(long, value_name = "DOMAIN")]
        domain: String,
        #[command(flatten)]
        state: StateArgs,
    },
    /// Issue a single API request and print the response
    Call {
        /// API path (e.g. /api/zones/list)
        path: String,
        /// Send as POST instead of GET
        #[arg(long)]
        post: bool,
        /// Request parameter (repeat for multiple values)
        #[arg(short = 'p', long = "param", value_name = "KEY=VALUE")]
        params: Vec<String>,
    },
}

type Target = (Box<dyn Resource>, State);

fn build_target(command: &Command) -> Result<Target, AppError> {
    Ok(match command {
        Command::Record {
            zone,
            name,
            rtype,
            desired,
        } => (
            Box::new(Record::new(zone, name, rtype, desired.desired()?)?),
            desired.state.state,
        ),
        Command::Zone {
            zone,
            node,
            desired,
        } => (
            Box::new(Zone::new(zone, node.clone(), desired.desired()?)?),
            desired.state.state,
        ),
        Command::DhcpScope { name, desired } => (
            Box::new(DhcpScope::new(name, desired.desired()?)?),
            desired.state.state,
        ),
        Command::User { username, desired } => (
            Box::new(User::new(username, desired.desired()?)?),
            desired.state.state,
        ),
        Command::Group { name, desired } => (
            Box::new(Group::new(name, desired.desired()?)?),
            desired.state.state,
        ),
        Command::Permission { section, desired } => (
            Box::new(Permission::new(section, desired.desired()?)?),
            desired.state.state,
        ),
        Command::Session {
            username,
            token_name,
            show_token,
            state,
        } => (
            Box::new(Session {
                username: username.clone(),
                token_name: token_name.clone(),
                show_token: *show_token,
            }),
            state.state,
        ),
        Command::Settings { desired } => (
            Box::new(ServerSettings::new(desired.desired()?)?),
            desired.state.state,
        ),
        Command::Cluster {
            role,
            node,
            force,
            desired,
        } => (
            Box::new(ClusterNode::new(
                *role,
                node.clone(),
                *force,
                desired.desired()?,
            )?),
            desired.state.state,
        ),
        Command::App { name, desired } => (
            Box::new(App::new(name, desired.desired()?)?),
            desired.state.state,
        ),
        Command::PrivateKey {
            zone,
            key_type,
            key_tag,
            node,
            desired,
        } => (
            Box::new(PrivateKey::new(
                zone,
                key_type,
                *key_tag,
                node.clone(),
                desired.desired()?,
            )?),
            desired.state.state,
        ),
        Command::AllowedZone { domain, state } => (
            Box::new(FilterZone {
                list: FilterList::Allowed,
                domain: domain.clone(),
            }),
            state.state,
        ),
        Command::BlockedZone { domain, state } => (
            Box::new(FilterZone {
                list: FilterList::Blocked,
                domain: domain.clone(),
            }),
            state.state,
        ),
        Command::Call { .. } => {
            return Err(AppError::validation("call is not a managed resource"));
        }
    })
}

async fn run(cli: &Cli) -> Result<String, AppError> {
    let config = cli.connection.to_config()?;
    let client = TechnitiumClient::new(&config)?;

    if let Command::Call { path, post, params } = &cli.command {
        let mut call = if *post {
            ApiCall::post(path.as_str())
        } else {
            ApiCall::get(path.as_str())
        };
        for raw in params {
            let (key, value) =
                input::parse_param(raw).map_err(|e| AppError::validation(format!("{e:#}")))?;
            call = call.param(key, value);
        }
        if cli.check && call.is_mutating() {
            info!(path = %call.path, "check mode, not sending");
            return Ok(render_planned_call(&masked(&call), cli.json));
        }
        let resp = client.call(&call).await?;
        let raw = resp.raw();
        resp.into_result()?;
        return Ok(render_response(&raw));
    }

    let (resource, state) = build_target(&cli.command)?;
    info!(kind = %resource.kind(), resource = %resource.describe(), ?state, "reconciling");
    let outcome = Reconciler::new(&client, cli.check)
        .reconcile(resource.as_ref(), state)
        .await?;
    Ok(render_outcome(&outcome, cli.json))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli).await {
        Ok(text) => {
            println!("{}", text.trim_end());
            ExitCode::SUCCESS
        }
        Err(err) => {
            if cli.json {
                println!("{}", render_error(&err, true));
            } else {
                eprintln!("{}", render_error(&err, false));
            }
            ExitCode::from(err.exit_code() as u8)
        }
    }
}

fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default.into());
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use serde_json::json;
    use wiremock::matchers::method;
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn call_cli(server: &MockServer, extra: &[&str]) -> Cli {
        let port = server.address().port().to_string();
        let mut args = vec![
            "technitium-ctl",
            "--api-url",
            "http://127.0.0.1",
            "--api-port",
            port.as_str(),
            "--api-token",
            "t",
        ];
        args.extend_from_slice(extra);
        Cli::try_parse_from(args).unwrap()
    }

    #[tokio::test]
    async fn check_mode_holds_back_raw_post() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"status": "ok"})))
            .expect(0)
            .mount(&server)
            .await;

        let cli = call_cli(
            &server,
            &[
                "--check",
                "call",
                "--post",
                "/api/zones/delete",
                "-p",
                "zone=example.com",
                "-p",
                "pass=hunter2",
            ],
        );
        let text = run(&cli).await.unwrap();
        assert!(text.contains("would call /api/zones/delete zone=example.com"));
        assert!(!text.contains("hunter2"));
        assert!(server.received_requests().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn check_mode_still_reads() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "status": "ok",
                "response": {"zones": []}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let cli = call_cli(&server, &["--check", "call", "/api/zones/list"]);
        let text = run(&cli).await.unwrap();
        assert!(text.contains("\"zones\""));
    }

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn record_subcommand_parses_desired_state() {
        let cli = Cli::try_parse_from([
            "technitium-ctl",
            "--api-url",
            "http://127.0.0.1",
            "--api-token",
            "t",
            "record",
            "--zone",
            "example.com",
            "--name",
            "www.example.com",
            "--type",
            "A",
            "-s",
            "ipAddress=192.0.2.1",
            "--state",
            "absent",
        ])
        .unwrap();
        let (resource, state) = build_target(&cli.command).unwrap();
        assert_eq!(state, State::Absent);
        assert_eq!(resource.kind().to_string(), "record");
    }
}
