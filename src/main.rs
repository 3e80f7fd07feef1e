use std::error::Error;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand};
use stitch_admin::api::AdminApi;
use stitch_admin::csv::{read_catalog, read_line_items, write_orders, write_quote};
use stitch_admin::import::{ImportError, import_rows, split_rows};
use stitch_admin::model::{Customer, Discount, OrderStatus, OrderUpdate};
use stitch_admin::session::login::{LoginFlow, Msg91Otp};
use stitch_admin::session::{ApiError, FileStore, HttpTransport, SessionStore};
use stitch_admin::{Amount, Config, DraftAction, OrderComposer, OrderDraft, SessionClient};
use tracing::warn;
use tracing_subscriber::EnvFilter;

/// Admin client for the tailoring shop backend
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Backend base URL
    #[arg(long, env = "STITCH_API_URL", default_value = "http://localhost:8000")]
    api_url: String,

    /// Request timeout in milliseconds
    #[arg(long, env = "STITCH_API_TIMEOUT_MS", default_value_t = 10_000)]
    timeout_ms: u64,

    /// Prefix of the login, refresh and logout endpoints
    #[arg(long, env = "STITCH_AUTH_PREFIX", default_value = "/admin")]
    auth_prefix: String,

    /// Directory holding the persisted session
    #[arg(long, env = "STITCH_STORAGE_DIR", default_value = ".stitch-admin")]
    storage_dir: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Log in with a mobile number and OTP
    Login {
        mobile: String,
        #[arg(long, env = "MSG91_WIDGET_ID")]
        widget_id: String,
        #[arg(long, env = "MSG91_AUTH_KEY", hide_env_values = true)]
        auth_key: String,
    },
    /// End the current session
    Logout,
    /// Show the logged-in admin
    Whoami,
    /// List orders as csv
    Orders {
        #[arg(long, default_value = "pending")]
        status: OrderStatus,
    },
    /// Show one order
    Order { order_id: String },
    /// Change the status of an order
    SetStatus {
        order_id: String,
        status: OrderStatus,
    },
    /// Price a draft offline from catalog and line item csv files
    Quote {
        catalog: PathBuf,
        items: PathBuf,
        #[arg(long, default_value = "0")]
        extra: Amount,
        /// Discount percentage
        #[arg(long)]
        discount: Option<f64>,
    },
    /// Create an order for a customer from a line item csv file
    Submit {
        /// Customer mobile number
        #[arg(long)]
        customer: String,
        items: PathBuf,
        #[arg(long, default_value = "0")]
        extra: Amount,
        /// Discount id
        #[arg(long)]
        discount: Option<String>,
        #[arg(long, default_value = "")]
        remarks: String,
    },
}

impl Cli {
    fn config(&self) -> Config {
        Config {
            api_url: self.api_url.clone(),
            timeout: Duration::from_millis(self.timeout_ms),
            auth_prefix: self.auth_prefix.clone(),
            storage_dir: self.storage_dir.clone(),
            ..Config::default()
        }
    }
}

fn warn_all(problems: &[ImportError]) {
    for problem in problems {
        warn!("{problem}");
    }
}

/// Any line item problem stops a submission before anything is sent.
fn refuse_partial(problems: &[ImportError]) -> Result<(), Box<dyn Error>> {
    warn_all(problems);
    if problems.is_empty() {
        Ok(())
    } else {
        Err(format!(
            "{} line item problem(s), nothing was submitted",
            problems.len()
        )
        .into())
    }
}

fn quote(
    catalog: &Path,
    items: &Path,
    extra: Amount,
    discount: Option<f64>,
) -> Result<(), Box<dyn Error>> {
    let mut dresses = Vec::new();
    for result in read_catalog(catalog)? {
        match result {
            Ok(dress) => dresses.push(dress),
            Err(e) => warn!("{e}"),
        }
    }

    let walk_in = Customer {
        id: "walk-in".to_string(),
        firstname: None,
        lastname: None,
        mobile: None,
    };
    let discounts = discount
        .map(|percent| Discount {
            id: "quote".to_string(),
            discount_per: percent,
            discount_desc: None,
        })
        .into_iter()
        .collect();

    let mut draft = OrderDraft::new();
    draft.apply(DraftAction::SelectCustomer(walk_in))?;
    draft.apply(DraftAction::LoadContext {
        customer: "walk-in".to_string(),
        address: None,
        dresses,
        discounts,
    })?;
    draft.apply(DraftAction::SetExtraCharges(extra))?;
    if discount.is_some() {
        draft.apply(DraftAction::ApplyDiscount(Some("quote".to_string())))?;
    }

    let (rows, unreadable) = split_rows(read_line_items(items)?);
    warn_all(&unreadable);
    warn_all(&import_rows(&mut draft, rows));

    let status = match draft.validate() {
        Ok(()) => "ready".to_string(),
        Err(e) => e.to_string(),
    };
    write_quote(
        io::stdout().lock(),
        draft.line_items().len(),
        &draft.totals(),
        &status,
    )?;
    Ok(())
}

fn connect(config: &Config) -> Result<AdminApi<HttpTransport, FileStore>, Box<dyn Error>> {
    let transport = HttpTransport::new(config)?;
    let store = FileStore::from_config(config)?;
    Ok(AdminApi::new(SessionClient::new(transport, store, config)))
}

fn prompt(label: &str) -> io::Result<String> {
    print!("{label}: ");
    io::stdout().flush()?;
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(line.trim().to_string())
}

async fn run(cli: Cli) -> Result<(), Box<dyn Error>> {
    let config = cli.config();

    match cli.command {
        Command::Quote {
            catalog,
            items,
            extra,
            discount,
        } => quote(&catalog, &items, extra, discount),
        Command::Login {
            mobile,
            widget_id,
            auth_key,
        } => {
            let api = connect(&config)?;
            let otp = Msg91Otp::new(widget_id, auth_key, &config)?;
            let mut flow = LoginFlow::new(api.session(), &otp);
            flow.send_otp(&mobile).await?;
            println!("OTP sent to +91 {}", flow.pending_mobile().unwrap_or(&mobile));
            let code = prompt("OTP")?;
            let session = flow.verify(&code).await?;
            println!("logged in as {}", session.user.display_name());
            Ok(())
        }
        Command::Logout => {
            connect(&config)?.session().logout().await?;
            println!("logged out");
            Ok(())
        }
        Command::Whoami => {
            let store = FileStore::from_config(&config)?;
            match store.get() {
                Some(session) => println!(
                    "{} ({})",
                    session.user.display_name(),
                    session.user.role.as_deref().unwrap_or("unknown role")
                ),
                None => println!("not logged in"),
            }
            Ok(())
        }
        Command::Orders { status } => {
            let orders = connect(&config)?.orders_by_status(status).await?;
            write_orders(io::stdout().lock(), &orders)?;
            Ok(())
        }
        Command::Order { order_id } => {
            let order = connect(&config)?.order(&order_id).await?;
            println!("{}", serde_json::to_string_pretty(&order)?);
            Ok(())
        }
        Command::SetStatus { order_id, status } => {
            let api = connect(&config)?;
            match status {
                OrderStatus::Cancelled => api.cancel_order(&order_id).await?,
                OrderStatus::Completed => api.complete_order(&order_id).await?,
                OrderStatus::Pending => {
                    api.update_order(&order_id, &OrderUpdate::status(status))
                        .await?
                }
            }
            println!("order {order_id} is now {status}");
            Ok(())
        }
        Command::Submit {
            customer,
            items,
            extra,
            discount,
            remarks,
        } => {
            let (rows, unreadable) = split_rows(read_line_items(&items)?);
            refuse_partial(&unreadable)?;

            let api = connect(&config)?;
            let customers = api.search_customers(&customer).await?;
            let selected = customers
                .iter()
                .find(|c| c.mobile.as_deref() == Some(customer.trim()))
                .or_else(|| customers.first())
                .cloned()
                .ok_or_else(|| format!("no customer matches '{customer}'"))?;

            let composer = OrderComposer::new(api);
            composer.select_customer(selected).await?;
            composer.dispatch(DraftAction::SetExtraCharges(extra))?;
            if discount.is_some() {
                composer.dispatch(DraftAction::ApplyDiscount(discount))?;
            }
            composer.dispatch(DraftAction::SetRemarks(remarks))?;
            refuse_partial(&import_rows(&mut &composer, rows))?;

            let totals = composer.totals();
            match composer.submit().await {
                Ok(receipt) => {
                    println!(
                        "{} (total {})",
                        receipt.message.as_deref().unwrap_or("Order created"),
                        totals.after_discount
                    );
                    Ok(())
                }
                Err(e) => Err(e.user_message().into()),
            }
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse().unwrap()))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            match e.downcast_ref::<ApiError>() {
                Some(ApiError::SessionExpired(_)) => {
                    eprintln!("error: session expired, please log in again")
                }
                _ => eprintln!("error: {e}"),
            }
            ExitCode::FAILURE
        }
    }
}
