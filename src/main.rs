use std::path::PathBuf;

use anyhow::{anyhow, Context};
use clap::{Args, Parser, Subcommand};
use serde_json::Value;

use amal_kitchen_lib::commands::{self, storefront::FileMenuSource};
use amal_kitchen_lib::order::OrderType;
use amal_kitchen_lib::sales::SalesRange;
use amal_kitchen_lib::{db, diagnostics};

const LONG_VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("BUILD_GIT_SHA"),
    ", built ",
    env!("BUILD_TIMESTAMP"),
    ")"
);

/// Amal Snack kitchen tools: ticket printing and storefront order logic.
#[derive(Debug, Parser)]
#[command(name = "amal-kitchen", version, long_version = LONG_VERSION)]
struct Cli {
    /// Directory holding the local store (defaults to the user data dir).
    #[arg(long, global = true, env = "AMAL_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Debug logging for this crate.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Send the kitchen ticket for an order to the printer.
    Print {
        #[arg(long)]
        order: PathBuf,
    },
    /// Render the kitchen ticket to a PNG without printing.
    Render {
        #[arg(long)]
        order: PathBuf,
        #[arg(long)]
        out: PathBuf,
    },
    /// Inspect or change the printer setup.
    Printer {
        #[command(subcommand)]
        action: PrinterAction,
    },
    /// Browse the menu from an exported menu file.
    Menu {
        #[command(subcommand)]
        action: MenuAction,
    },
    /// Work with the stored cart.
    Cart {
        #[command(subcommand)]
        action: CartAction,
    },
    /// Build the order and the WhatsApp handoff link.
    Checkout(CheckoutArgs),
    /// Delivery areas and fees.
    Areas,
    /// Schedulable delivery/pickup slots.
    Slots {
        /// Minimum preparation time in minutes.
        #[arg(long, default_value_t = 0)]
        min_minutes: u32,
    },
    /// Sales summary from an orders export.
    Sales {
        #[arg(long)]
        orders: PathBuf,
        #[arg(long, default_value = "today", value_parser = SalesRange::parse)]
        range: SalesRange,
    },
    /// Kitchen board snapshot from an orders export.
    Orders {
        #[arg(long)]
        orders: PathBuf,
    },
    /// Banner and theme documents.
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
    /// Build info, store health, log housekeeping.
    Diagnostics {
        #[command(subcommand)]
        action: DiagnosticsAction,
    },
}

#[derive(Debug, Subcommand)]
enum PrinterAction {
    Show,
    SetIp { ip: String },
    /// Store any other printer setting (timeout_ms, font_path, show_prices, ...).
    Set { key: String, value: String },
    /// Print a text-mode test page.
    Test,
}

#[derive(Debug, Args)]
struct MenuFile {
    /// JSON export of the menu table.
    #[arg(long)]
    menu: PathBuf,
    /// Storage base URL for relative image paths.
    #[arg(long, env = "AMAL_STORAGE_BASE", default_value = "")]
    storage_base: String,
}

impl MenuFile {
    fn source(self) -> FileMenuSource {
        FileMenuSource {
            path: self.menu,
            storage_base: self.storage_base,
        }
    }
}

#[derive(Debug, Subcommand)]
enum MenuAction {
    List {
        #[command(flatten)]
        file: MenuFile,
        #[arg(long)]
        category: Option<String>,
        #[arg(long, default_value = "")]
        query: String,
    },
    Categories,
    AddCategory { label: String, key: String },
    /// Validate an item as the editor would before saving.
    Check { item: PathBuf },
}

#[derive(Debug, Subcommand)]
enum CartAction {
    Show,
    Add {
        #[command(flatten)]
        file: MenuFile,
        #[arg(long)]
        item: String,
        #[arg(long, default_value_t = 1)]
        qty: u32,
        /// Repeat for each picked option.
        #[arg(long = "option")]
        options: Vec<String>,
    },
    SetQty { key: String, qty: i64 },
    Remove { key: String },
    Clear,
}

#[derive(Debug, Args)]
struct CheckoutArgs {
    /// Cart JSON; the stored cart is used when omitted.
    #[arg(long)]
    cart: Option<PathBuf>,
    /// Delivery form JSON; the stored form is used when omitted.
    #[arg(long)]
    info: Option<PathBuf>,
    #[arg(long)]
    pickup: bool,
    /// Print the kitchen ticket under this order number as well.
    #[arg(long)]
    ticket: Option<i64>,
}

#[derive(Debug, Subcommand)]
enum ConfigAction {
    Show { document: String },
    Set { document: String, file: PathBuf },
}

#[derive(Debug, Subcommand)]
enum DiagnosticsAction {
    About,
    Health,
    PruneLogs {
        #[arg(long, default_value_t = diagnostics::MAX_LOG_FILES)]
        keep: usize,
    },
}

async fn dispatch(cli: Cli) -> anyhow::Result<Value> {
    use commands::{diagnostics as diag, print, storefront};

    let data_dir = cli.data_dir.unwrap_or_else(diagnostics::get_data_dir);
    let state = db::init(&data_dir).map_err(|e| anyhow!(e))?;

    let result = match cli.command {
        Command::Print { order } => print::kitchen_print_ticket(&state, &order).await,
        Command::Render { order, out } => print::kitchen_render_ticket(&state, &order, &out),
        Command::Printer { action } => match action {
            PrinterAction::Show => print::printer_show(&state),
            PrinterAction::SetIp { ip } => print::printer_set_ip(&state, &ip),
            PrinterAction::Set { key, value } => print::printer_set(&state, &key, &value),
            PrinterAction::Test => print::printer_test(&state).await,
        },
        Command::Menu { action } => match action {
            MenuAction::List {
                file,
                category,
                query,
            } => storefront::menu_list(&state, &file.source(), category.as_deref(), &query).await,
            MenuAction::Categories => storefront::menu_categories(&state),
            MenuAction::AddCategory { label, key } => {
                storefront::menu_add_category(&state, &label, &key)
            }
            MenuAction::Check { item } => storefront::menu_check_item(&item),
        },
        Command::Cart { action } => match action {
            CartAction::Show => storefront::cart_show(&state),
            CartAction::Add {
                file,
                item,
                qty,
                options,
            } => storefront::cart_add(&state, &file.source(), &item, qty, &options).await,
            CartAction::SetQty { key, qty } => storefront::cart_set_quantity(&state, &key, qty),
            CartAction::Remove { key } => storefront::cart_remove(&state, &key),
            CartAction::Clear => storefront::cart_clear(&state),
        },
        Command::Checkout(args) => {
            let request = storefront::CheckoutRequest {
                cart_path: args.cart,
                info_path: args.info,
                order_type: if args.pickup {
                    OrderType::Pickup
                } else {
                    OrderType::Delivery
                },
                ticket_number: args.ticket,
            };
            storefront::checkout_order(&state, &request).await
        }
        Command::Areas => storefront::delivery_areas(),
        Command::Slots { min_minutes } => storefront::schedule_slots(&state, min_minutes),
        Command::Sales { orders, range } => storefront::sales_summary(&state, &orders, range),
        Command::Orders { orders } => storefront::orders_board(&orders, chrono::Utc::now()),
        Command::Config { action } => match action {
            ConfigAction::Show { document } => storefront::config_show(&state, &document),
            ConfigAction::Set { document, file } => {
                storefront::config_set(&state, &document, &file)
            }
        },
        Command::Diagnostics { action } => match action {
            DiagnosticsAction::About => diag::diagnostics_get_about(),
            DiagnosticsAction::Health => diag::diagnostics_get_system_health(&state),
            DiagnosticsAction::PruneLogs { keep } => diag::diagnostics_prune_logs(keep),
        },
    };
    result.map_err(|e| anyhow!(e))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let log_guard = amal_kitchen_lib::init_logging(cli.verbose);

    let payload = dispatch(cli).await?;
    let text = serde_json::to_string_pretty(&payload).context("encode command output")?;
    println!("{text}");

    if payload.get("success").and_then(Value::as_bool) == Some(false) {
        drop(log_guard);
        std::process::exit(2);
    }
    Ok(())
}
