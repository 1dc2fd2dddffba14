//! Command-line front end for the execution state runtime.
//!
//! Loads a domain configuration, runs one command through the context loader
//! and prints the resulting state as JSON.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use serde_json::json;

use quad_runtime::cache::{SessionCache, SessionKey};
use quad_runtime::command::{Action, Command};
use quad_runtime::context::{CommandMessage, ExecutionContext};
use quad_runtime::convert::JsonConverter;
use quad_runtime::error::RuntimeError;
use quad_runtime::executor::ExecutorRegistry;
use quad_runtime::exit_codes;
use quad_runtime::handler::default_handlers;
use quad_runtime::io::config::{RuntimeConfig, load_config, write_config};
use quad_runtime::io::domain_config::{DomainConfig, load_domain_config};
use quad_runtime::loader::{ExecutionContextLoader, Loaded};
use quad_runtime::logging;
use quad_runtime::quad_builder::QuadModelBuilder;
use quad_runtime::resolver::CommandPathVariableResolver;
use quad_runtime::session::ClientUser;
use quad_runtime::state::builder::{DefaultStateBuilder, StateBuilderSupport};
use quad_runtime::state::gateway::{InMemoryParamStateGateway, SchemaValidator};
use quad_runtime::state::param::{ParamRef, TreeKind};

#[derive(Parser)]
#[command(
    name = "quad-runtime",
    version,
    about = "Command-driven execution state runtime"
)]
struct Cli {
    /// Runtime config file; defaults apply when it does not exist.
    #[arg(long, global = true, default_value = "quad-runtime.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Cmd,
}

#[derive(Subcommand)]
enum Cmd {
    /// Write the default runtime config to `--config`.
    InitConfig {
        /// Overwrite an existing file.
        #[arg(short, long)]
        force: bool,
    },
    /// Check a domain config for unresolved models, bindings and mappings.
    Validate {
        #[arg(long)]
        domain: PathBuf,
    },
    /// Load a command's execution context and print its state.
    Load(CommandArgs),
    /// Load a command's context and resolve a path template against it.
    Resolve {
        #[command(flatten)]
        command: CommandArgs,

        /// Template containing `<!...!>` markers.
        #[arg(long)]
        template: String,

        /// Param the template is evaluated against, in the entity tree.
        #[arg(long, default_value = "/")]
        subject: String,
    },
}

#[derive(Args)]
struct CommandArgs {
    #[arg(long)]
    domain: PathBuf,

    /// Session id; defaults to `default_session_id` from the runtime config.
    #[arg(long)]
    session: Option<String>,

    #[arg(long, default_value = "acme")]
    client: String,

    #[arg(long, default_value = "app")]
    app: String,

    /// Root domain alias.
    #[arg(long)]
    root: String,

    /// Entity id of the root domain.
    #[arg(long = "ref")]
    ref_id: Option<String>,

    /// Action, e.g. `new`, `get`, `search`.
    #[arg(long)]
    action: Action,

    /// Param path below the root domain, e.g. `/address/city`.
    #[arg(long)]
    path: Option<String>,

    /// Request parameter `key=value`; repeatable.
    #[arg(long = "param", value_parser = parse_key_value)]
    params: Vec<(String, String)>,

    /// Login id of the authenticated user.
    #[arg(long)]
    login: Option<String>,
}

impl CommandArgs {
    fn to_message(&self) -> CommandMessage {
        let mut cmd = Command::new(&self.client, &self.app, &self.root, self.action);
        if let Some(ref_id) = &self.ref_id {
            cmd = cmd.with_ref_id(ref_id.as_str());
        }
        if let Some(path) = &self.path {
            cmd = cmd.with_path(path);
        }
        for (key, value) in &self.params {
            cmd = cmd.with_param(key.as_str(), value.as_str());
        }
        let message = CommandMessage::new(cmd);
        match &self.login {
            Some(login) => message.with_user(ClientUser::new(login.as_str())),
            None => message,
        }
    }
}

fn parse_key_value(raw: &str) -> Result<(String, String), String> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| format!("expected key=value, got '{raw}'"))?;
    if key.is_empty() {
        return Err(format!("empty key in '{raw}'"));
    }
    Ok((key.to_string(), value.to_string()))
}

fn main() {
    logging::init();
    if let Err(err) = run() {
        eprintln!("{:#}", err);
        std::process::exit(exit_code(&err));
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    match cli.command {
        Cmd::InitConfig { force } => cmd_init_config(&cli.config, force),
        Cmd::Validate { domain } => cmd_validate(&domain),
        Cmd::Load(args) => cmd_load(&cli.config, &args),
        Cmd::Resolve {
            command,
            template,
            subject,
        } => cmd_resolve(&cli.config, &command, &template, &subject),
    }
}

fn cmd_init_config(config_path: &Path, force: bool) -> Result<()> {
    if config_path.exists() && !force {
        return Err(anyhow!(
            "{} already exists (use --force to overwrite)",
            config_path.display()
        ));
    }
    write_config(config_path, &RuntimeConfig::default())?;
    println!("wrote {}", config_path.display());
    Ok(())
}

fn cmd_validate(domain: &Path) -> Result<()> {
    let config = load_domain_config(domain)?;
    println!(
        "ok: {} root domain(s)",
        config.root_aliases().collect::<Vec<_>>().join(", ")
    );
    Ok(())
}

fn cmd_load(config_path: &Path, args: &CommandArgs) -> Result<()> {
    let (loader, loaded, session) = load(config_path, args)?;
    let quad = loaded.context.require_quad_model()?;
    let state = quad.read();
    let mut out = json!({
        "context": loaded.context.id(),
        "strategy": loaded.strategy.to_string(),
        "cached": loader.cache().exists(&SessionKey::new(&loaded.context, &session)),
        "core": state.leaf_state(ParamRef::root(TreeKind::Core))?,
        "flow": state.leaf_state(ParamRef::root(TreeKind::Flow))?,
    });
    if state.view().is_some() {
        out["view"] = state.leaf_state(ParamRef::root(TreeKind::View))?;
    }
    drop(state);
    println!(
        "{}",
        serde_json::to_string_pretty(&out).context("serialize load output")?
    );
    loader.clear();
    Ok(())
}

fn cmd_resolve(config_path: &Path, args: &CommandArgs, template: &str, subject: &str) -> Result<()> {
    let (loader, loaded, _) = load(config_path, args)?;
    let subject_ref = {
        let state = loaded.context.require_quad_model()?.read();
        let tree = state.entity_tree();
        state
            .find(tree, subject)
            .ok_or_else(|| anyhow!("no param '{subject}' in {tree:?} tree"))?
    };
    let resolver = CommandPathVariableResolver::new(Arc::new(JsonConverter));
    let resolved = resolver.resolve(&loaded.context, subject_ref, template)?;
    println!("{resolved}");
    loader.clear();
    Ok(())
}

/// Run the command through a fresh loader. Returns the loader, the loaded
/// context and the session id used.
fn load(config_path: &Path, args: &CommandArgs) -> Result<(ExecutionContextLoader, Loaded, String)> {
    let runtime = load_config(config_path)?;
    let domain = load_domain_config(&args.domain)?;
    let loader = build_loader(&runtime, domain);
    let session = args
        .session
        .clone()
        .unwrap_or_else(|| runtime.default_session_id.clone());
    let message = args.to_message();
    let context_id = ExecutionContext::new(message.clone()).id().to_string();
    let loaded = loader
        .load_message(message, &session)
        .with_context(|| format!("load {context_id}"))?;
    Ok((loader, loaded, session))
}

fn build_loader(runtime: &RuntimeConfig, domain: DomainConfig) -> ExecutionContextLoader {
    let builder = Arc::new(QuadModelBuilder::new(
        Arc::new(domain),
        Arc::new(DefaultStateBuilder),
        StateBuilderSupport {
            validator: Arc::new(SchemaValidator),
            gateway: Arc::new(InMemoryParamStateGateway::new()),
        },
    ));
    let executors = ExecutorRegistry::with_defaults(Arc::clone(&builder), default_handlers());
    let cache: Arc<dyn SessionCache> = Arc::new(runtime.session_cache());
    ExecutionContextLoader::new(builder, executors, cache)
}

fn exit_code(err: &anyhow::Error) -> i32 {
    let runtime = err
        .chain()
        .find_map(|cause| cause.downcast_ref::<RuntimeError>());
    match runtime {
        Some(RuntimeError::Lookup(_)) => exit_codes::NOT_FOUND,
        Some(RuntimeError::Conversion { .. } | RuntimeError::Validation { .. }) => {
            exit_codes::REJECTED
        }
        _ => exit_codes::INVALID,
    }
}
