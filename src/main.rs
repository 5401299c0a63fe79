use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "ordermail",
    version,
    about = "Import pick-up request spreadsheets from Gmail"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Output structured JSON
    #[arg(long, global = true)]
    json: bool,

    /// SQLite database path (defaults to ~/.ordermail/ordermail.db)
    #[arg(long, global = true, env = "ORDERMAIL_DB_PATH")]
    db_path: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Process the first matching message once
    Run(RunArgs),
    /// Obtain a refresh token through the Google consent page
    Authorize(AuthorizeArgs),
    /// List mailbox labels and their ids
    Labels(GmailArgs),
    /// List imported orders
    Orders(OrdersArgs),
    /// Show order and batch counts
    Stats,
}

#[derive(Debug, Clone, Args)]
struct GmailArgs {
    /// Mailbox user id
    #[arg(long, env = "ORDERMAIL_GMAIL_USER", default_value = "me")]
    user_id: String,
    #[arg(long, env = "ORDERMAIL_GMAIL_CLIENT_ID")]
    client_id: Option<String>,
    #[arg(long, env = "ORDERMAIL_GMAIL_CLIENT_SECRET", hide_env_values = true)]
    client_secret: Option<String>,
    #[arg(long, env = "ORDERMAIL_GMAIL_REFRESH_TOKEN", hide_env_values = true)]
    refresh_token: Option<String>,
    /// Use this access token as-is instead of the refresh grant
    #[arg(long, env = "ORDERMAIL_GMAIL_ACCESS_TOKEN", hide_env_values = true)]
    access_token: Option<String>,
    /// 64 hex characters; enables the encrypted access-token cache
    #[arg(long, env = "ORDERMAIL_TOKEN_CACHE_KEY", hide_env_values = true)]
    token_cache_key: Option<String>,
    #[arg(long, env = "ORDERMAIL_GMAIL_API_BASE")]
    api_base: Option<String>,
    #[arg(long, env = "ORDERMAIL_GOOGLE_TOKEN_URL")]
    token_url: Option<String>,
}

#[derive(Debug, Args)]
struct RunArgs {
    #[command(flatten)]
    gmail: GmailArgs,

    /// Sender address of the report emails
    #[arg(long, env = "ORDERMAIL_FROM")]
    from: String,
    #[arg(long, env = "ORDERMAIL_SUBJECT")]
    subject: String,
    #[arg(long, env = "ORDERMAIL_FOLDER_LABEL", default_value = "INBOX")]
    folder_label: String,

    /// Pipe-delimited label ids marking a failed message
    #[arg(long, env = "ORDERMAIL_FAILED_LABELS")]
    failed_labels: String,
    /// Pipe-delimited label ids marking a processed message
    #[arg(long, env = "ORDERMAIL_PROCESSED_LABELS")]
    processed_labels: String,
    /// Pipe-delimited label ids for a sheet with no orders
    #[arg(long, env = "ORDERMAIL_EMPTY_LABELS")]
    empty_labels: Option<String>,

    #[arg(long, env = "ORDERMAIL_ATTACHMENT_EXTENSION", default_value = ".xlsx")]
    attachment_extension: String,
    #[arg(long, env = "ORDERMAIL_ATTACHMENT_TOKEN", default_value = "Pick Up Request")]
    attachment_token: String,

    /// Scratch directory, wiped at start (defaults to ~/.ordermail/tmp)
    #[arg(long, env = "ORDERMAIL_SCRATCH_DIR")]
    scratch_dir: Option<PathBuf>,
    #[arg(long, env = "ORDERMAIL_STAGED_FILE", default_value = "pickup_report.xlsx")]
    staged_file_name: String,

    #[arg(long, env = "ORDERMAIL_CHANNEL_ID")]
    channel_id: String,
    #[arg(long, env = "ORDERMAIL_ORDER_PREFIX")]
    order_prefix: String,
    #[arg(long, env = "ORDERMAIL_PREFIX_SEPARATOR", default_value = "-")]
    prefix_separator: String,

    /// Pipe-delimited columns every data row must fill
    #[arg(
        long = "required-columns",
        env = "ORDERMAIL_REQUIRED_COLUMNS",
        value_delimiter = '|'
    )]
    required_columns: Vec<String>,
    #[arg(long, env = "ORDERMAIL_ORDER_COLUMN", default_value = "Order Number")]
    order_column: String,
}

#[derive(Debug, Args)]
struct AuthorizeArgs {
    #[command(flatten)]
    gmail: GmailArgs,

    /// Redirect URI registered for the OAuth client
    #[arg(long, env = "ORDERMAIL_REDIRECT_URI", default_value = "http://localhost")]
    redirect_uri: String,
}

#[derive(Debug, Args)]
struct OrdersArgs {
    #[arg(long)]
    channel: Option<String>,
    #[arg(long, default_value_t = 50)]
    limit: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    commands::dispatch(cli).await
}

mod commands {
    use std::io::Write;
    use std::path::PathBuf;

    use anyhow::{anyhow, Context, Result};

    use ordermail::attachment::AttachmentMatcher;
    use ordermail::config::{default_scratch_dir, parse_label_list, SalesChannel, WorkflowConfig};
    use ordermail::db::Database;
    use ordermail::importer::SqliteOrderImporter;
    use ordermail::labels::LabelConfig;
    use ordermail::mailbox::auth::{GoogleAuthorizer, TokenCache};
    use ordermail::mailbox::{GmailMailbox, QueryFilter};
    use ordermail::output::{self, OutputFormat};
    use ordermail::staging::StagingStore;
    use ordermail::validator::SheetValidator;
    use ordermail::workflow::Workflow;

    use super::{AuthorizeArgs, Cli, Commands, GmailArgs, OrdersArgs, RunArgs};

    pub async fn dispatch(cli: Cli) -> Result<()> {
        let format = OutputFormat::from_json_flag(cli.json);
        match cli.command {
            Commands::Run(args) => handle_run(args, cli.db_path, format).await,
            Commands::Authorize(args) => handle_authorize(args).await,
            Commands::Labels(args) => handle_labels(args, cli.db_path, format).await,
            Commands::Orders(args) => handle_orders(args, cli.db_path, format),
            Commands::Stats => handle_stats(cli.db_path, format),
        }
    }

    async fn handle_run(args: RunArgs, db_path: Option<PathBuf>, format: OutputFormat) -> Result<()> {
        let config = build_config(&args);
        config.validate().context("invalid run configuration")?;

        let scratch_dir = match &args.scratch_dir {
            Some(dir) => dir.clone(),
            None => default_scratch_dir().context("resolve default scratch directory")?,
        };
        let staging = StagingStore::new(scratch_dir, args.staged_file_name.as_str());
        staging
            .reset()
            .with_context(|| format!("reset scratch directory {}", staging.dir().display()))?;

        let db = open_db(db_path)?;
        let mailbox = connect_mailbox(&args.gmail, &db).await?;
        let validator = SheetValidator::new(args.required_columns.clone(), &args.order_column)
            .context("compile order reference pattern")?;
        let importer = SqliteOrderImporter::new(&db).with_order_column(&args.order_column);

        let outcome = Workflow::new(&config, &mailbox, &staging, &validator, &importer)
            .run()
            .await?;

        println!("{}", output::format_run_outcome(format, &outcome)?);
        Ok(())
    }

    async fn handle_authorize(args: AuthorizeArgs) -> Result<()> {
        let authorizer = authorizer(&args.gmail)?;
        let url = authorizer.authorization_url(&args.redirect_uri)?;

        println!("Open this URL in a browser and grant access:\n\n{url}\n");
        print!("Paste the authorization code: ");
        std::io::stdout().flush().context("flush stdout")?;

        let mut code = String::new();
        std::io::stdin()
            .read_line(&mut code)
            .context("read authorization code")?;
        let code = code.trim();
        if code.is_empty() {
            return Err(anyhow!("no authorization code entered"));
        }

        let grant = authorizer
            .exchange_code(code, &args.redirect_uri)
            .await
            .context("exchange authorization code")?;
        let refresh_token = grant.refresh_token.ok_or_else(|| {
            anyhow!("google returned no refresh token; revoke the app's access and retry")
        })?;

        println!("\nSet ORDERMAIL_GMAIL_REFRESH_TOKEN to:\n{refresh_token}");
        Ok(())
    }

    async fn handle_labels(
        args: GmailArgs,
        db_path: Option<PathBuf>,
        format: OutputFormat,
    ) -> Result<()> {
        let db = open_db(db_path)?;
        let mailbox = connect_mailbox(&args, &db).await?;
        let labels = mailbox.list_labels().await.context("list gmail labels")?;
        println!("{}", output::format_labels(format, &labels)?);
        Ok(())
    }

    fn handle_orders(args: OrdersArgs, db_path: Option<PathBuf>, format: OutputFormat) -> Result<()> {
        let db = open_db(db_path)?;
        let orders = db.list_orders(args.channel.as_deref(), args.limit)?;
        println!("{}", output::format_orders(format, &orders)?);
        Ok(())
    }

    fn handle_stats(db_path: Option<PathBuf>, format: OutputFormat) -> Result<()> {
        let db = open_db(db_path)?;
        let stats = db.get_stats()?;
        println!("{}", output::format_stats(format, &stats)?);
        Ok(())
    }

    fn build_config(args: &RunArgs) -> WorkflowConfig {
        let mut config = WorkflowConfig::new(
            QueryFilter::new(&args.from, &args.subject),
            LabelConfig {
                failed: parse_label_list(&args.failed_labels),
                processed: parse_label_list(&args.processed_labels),
                empty: args
                    .empty_labels
                    .as_deref()
                    .map(parse_label_list)
                    .unwrap_or_default(),
            },
            SalesChannel::new(&args.channel_id, &args.order_prefix)
                .with_separator(&args.prefix_separator),
        );
        config.folder_labels = parse_label_list(&args.folder_label);
        config.attachment = AttachmentMatcher::new(&args.attachment_extension, &args.attachment_token);
        config
    }

    fn open_db(db_path: Option<PathBuf>) -> Result<Database> {
        let db_path = match db_path {
            Some(path) => path,
            None => Database::default_db_path().context("resolve default ordermail database path")?,
        };
        Database::open(&db_path)
            .with_context(|| format!("open ordermail database at {}", db_path.display()))
    }

    fn authorizer(gmail: &GmailArgs) -> Result<GoogleAuthorizer> {
        let client_id = gmail
            .client_id
            .as_deref()
            .ok_or_else(|| anyhow!("--client-id or ORDERMAIL_GMAIL_CLIENT_ID is required"))?;
        let client_secret = gmail.client_secret.as_deref().ok_or_else(|| {
            anyhow!("--client-secret or ORDERMAIL_GMAIL_CLIENT_SECRET is required")
        })?;

        let authorizer = GoogleAuthorizer::new(client_id, client_secret);
        Ok(match &gmail.token_url {
            Some(url) => authorizer.with_token_url(url),
            None => authorizer,
        })
    }

    async fn connect_mailbox(gmail: &GmailArgs, db: &Database) -> Result<GmailMailbox> {
        let access_token = match &gmail.access_token {
            Some(token) => token.clone(),
            None => {
                let refresh_token = gmail.refresh_token.as_deref().ok_or_else(|| {
                    anyhow!("--refresh-token or ORDERMAIL_GMAIL_REFRESH_TOKEN is required")
                })?;
                let cache =
                    TokenCache::from_hex_key(db, &gmail.user_id, gmail.token_cache_key.as_deref())?;
                authorizer(gmail)?
                    .access_token(refresh_token, cache.as_ref())
                    .await
                    .context("obtain gmail access token")?
            }
        };

        let mailbox = GmailMailbox::new(&gmail.user_id, access_token);
        Ok(match &gmail.api_base {
            Some(base) => mailbox.with_api_base(base),
            None => mailbox,
        })
    }
}
