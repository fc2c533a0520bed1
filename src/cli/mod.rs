use anyhow::{Context, Result};
use chrono::{DateTime, Datelike, NaiveDate, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use uuid::Uuid;

use crate::application::{
    BillFilter, BillPayment, BillUpdate, CategoryUpdate, InstitutionUpdate, LedgerService,
    NewAdjustment, NewBill, NewCategory, NewInstitution, NewProduct, NewService, NewTransaction,
    NewTransfer, ProductUpdate, ServiceUpdate, TransactionFilter, TransactionUpdate,
};
use crate::config::Settings;
use crate::domain::{
    AdjustmentType, BillStatus, CardProvider, CategoryType, CreditLimits, Currency,
    InstitutionType, Money, OwnerId, ProductType, SummaryStatus, TransactionType, format_money,
    parse_money,
};
use crate::logging::init_tracing;

/// Banquito - Personal Finance Ledger
#[derive(Parser)]
#[command(name = "banquito")]
#[command(about = "A personal finance ledger with credit-card statements, installments and recurring bills")]
#[command(version)]
pub struct Cli {
    /// Settings file (defaults to ./banquito.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<String>,

    /// Database file path (overrides the settings file)
    #[arg(short, long, global = true)]
    pub database: Option<String>,

    /// Owner id every command acts on (overrides the settings file)
    #[arg(long, global = true)]
    pub owner: Option<Uuid>,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new database and seed the default categories
    Init,

    /// Category management commands
    #[command(subcommand)]
    Category(CategoryCommands),

    /// Institution management commands
    #[command(subcommand)]
    Institution(InstitutionCommands),

    /// Product (account, card, cash) management commands
    #[command(subcommand)]
    Product(ProductCommands),

    /// Income and expense commands
    #[command(subcommand)]
    Tx(TxCommands),

    /// Move money between two products
    Transfer {
        /// Amount to transfer (e.g., "50.00" or "50")
        amount: String,

        /// Source product id
        #[arg(long)]
        from: Uuid,

        /// Destination product id
        #[arg(long)]
        to: Uuid,

        /// Description of the transfer
        #[arg(short = 'm', long, default_value = "Transfer")]
        description: String,

        /// Category id
        #[arg(long)]
        category: Option<Uuid>,

        /// Date of the transfer (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },

    /// Credit-card statement commands
    #[command(subcommand)]
    Summary(SummaryCommands),

    /// Recurring service commands
    #[command(subcommand)]
    Service(ServiceCommands),

    /// Monthly bill commands
    #[command(subcommand)]
    Bill(BillCommands),

    /// Forecast upcoming statements of a credit card
    Project {
        /// Credit card id
        product: Uuid,

        /// Number of months to project
        #[arg(short, long, default_value = "6")]
        months: u32,
    },
}

#[derive(Subcommand)]
pub enum CategoryCommands {
    /// Create a category
    Add {
        name: String,

        /// Type: income, expense
        #[arg(short = 't', long = "type", default_value = "expense")]
        category_type: String,

        #[arg(long)]
        icon: Option<String>,
    },
    /// List categories
    List {
        /// Filter by type: income, expense
        #[arg(short = 't', long = "type")]
        category_type: Option<String>,
    },
    /// Rename a category or change its icon
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        icon: Option<String>,
    },
    /// Delete an unused category
    Delete { id: Uuid },
    /// Insert the default categories that are missing
    Seed,
}

#[derive(Subcommand)]
pub enum InstitutionCommands {
    /// Create an institution
    Add {
        name: String,

        /// Type: bank, wallet
        #[arg(short = 't', long = "type", default_value = "bank")]
        institution_type: String,

        /// Cards of this institution share one statement
        #[arg(long)]
        share_summary: bool,
    },
    /// List institutions
    List,
    /// Update an institution
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        share_summary: Option<bool>,
    },
    /// Delete an institution together with its products
    Delete { id: Uuid },
}

#[derive(Subcommand)]
pub enum ProductCommands {
    /// Create a product
    Add {
        name: String,

        /// Type: cash, savings_account, checking_account, debit_card, credit_card, loan
        #[arg(short = 't', long = "type")]
        product_type: String,

        /// Currency: ars, usd, usdt, usdc, btc
        #[arg(long, default_value = "usd")]
        currency: String,

        /// Institution id
        #[arg(long)]
        institution: Option<Uuid>,

        /// Opening balance
        #[arg(long)]
        balance: Option<String>,

        /// Account backing a debit card
        #[arg(long)]
        linked: Option<Uuid>,

        #[arg(long)]
        closing_day: Option<u32>,

        #[arg(long)]
        due_day: Option<u32>,

        /// Total credit limit
        #[arg(long)]
        limit: Option<String>,

        /// Single-payment limit (split mode)
        #[arg(long)]
        limit_single: Option<String>,

        /// Installment limit (split mode)
        #[arg(long)]
        limit_installments: Option<String>,

        /// Use one pool for single-payment and installment purchases
        #[arg(long)]
        unified: bool,

        #[arg(long)]
        last_four: Option<String>,

        /// Provider: visa, mastercard, amex, other
        #[arg(long)]
        provider: Option<String>,
    },
    /// List products
    List {
        /// Filter by institution id
        #[arg(long)]
        institution: Option<Uuid>,
    },
    /// Show product details
    Show { id: Uuid },
    /// Update a product
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        closing_day: Option<u32>,
        #[arg(long)]
        due_day: Option<u32>,
        #[arg(long)]
        last_four: Option<String>,
    },
    /// Delete a product with its statements and transactions
    Delete { id: Uuid },
}

#[derive(Subcommand)]
pub enum TxCommands {
    /// Record an expense
    Expense {
        /// Product id
        product: Uuid,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        #[arg(short = 'm', long)]
        description: String,

        /// Category id
        #[arg(long)]
        category: Option<Uuid>,

        /// Date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,

        /// Number of monthly installments (credit cards only)
        #[arg(short, long, default_value = "1")]
        installments: u32,

        /// Restructure into three installments when the statement is paid
        #[arg(long)]
        plan_z: bool,
    },
    /// Record an income
    Income {
        /// Product id
        product: Uuid,

        /// Amount (e.g., "50.00" or "50")
        amount: String,

        #[arg(short = 'm', long)]
        description: String,

        /// Category id
        #[arg(long)]
        category: Option<Uuid>,

        /// Date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },
    /// List transactions, newest first
    List {
        #[arg(long)]
        product: Option<Uuid>,
        #[arg(long)]
        category: Option<Uuid>,
        /// Type: income, expense, transfer
        #[arg(short = 't', long = "type")]
        transaction_type: Option<String>,
        #[arg(short, long)]
        limit: Option<u32>,
    },
    /// Show a transaction
    Show { id: Uuid },
    /// Edit a transaction
    Edit {
        id: Uuid,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        date: Option<String>,
        #[arg(short = 'm', long)]
        description: Option<String>,
        #[arg(long)]
        category: Option<Uuid>,
        #[arg(long)]
        plan_z: Option<bool>,
    },
    /// Delete a transaction and reverse its balance effect
    Delete { id: Uuid },
}

#[derive(Subcommand)]
pub enum SummaryCommands {
    /// Generate or recompute the statement of a month
    Generate {
        /// Credit card id
        product: Uuid,
        year: i32,
        month: u32,
    },
    /// Statement of the current month
    Current { product: Uuid },
    /// List statements of a card
    List {
        product: Uuid,
        /// Filter by status: draft, closed, paid
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a statement with its items and adjustments
    Show { id: Uuid },
    /// Add a commission, tax, interest, insurance, credit or other adjustment
    Adjust {
        id: Uuid,
        /// Type: commission, tax, interest, insurance, credit, other
        #[arg(short = 't', long = "type")]
        adjustment_type: String,
        amount: String,
        #[arg(short = 'm', long)]
        description: String,
    },
    /// Remove an adjustment
    Unadjust { id: Uuid, adjustment: Uuid },
    /// Close a draft statement
    Close { id: Uuid },
    /// Pay a statement
    Pay {
        id: Uuid,
        /// Funding product id
        #[arg(long)]
        from: Uuid,
        /// Payment date (YYYY-MM-DD, defaults to now)
        #[arg(long)]
        date: Option<String>,
    },
    /// Reset a statement to an empty draft
    Reset { id: Uuid },
}

#[derive(Subcommand)]
pub enum ServiceCommands {
    /// Create a recurring service
    Add {
        name: String,
        #[arg(long)]
        category: Option<Uuid>,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        due_day: Option<u32>,
    },
    /// List services
    List {
        /// Include inactive services
        #[arg(long)]
        all: bool,
    },
    /// Update a service
    Update {
        id: Uuid,
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        category: Option<Uuid>,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        due_day: Option<u32>,
        #[arg(long)]
        active: Option<bool>,
    },
    /// Delete a service and its bills
    Delete { id: Uuid },
}

#[derive(Subcommand)]
pub enum BillCommands {
    /// Bills of a month, creating the missing ones
    Month {
        /// Year (defaults to the current one)
        year: Option<i32>,
        /// Month (defaults to the current one)
        month: Option<u32>,
    },
    /// Create a bill by hand
    Add {
        service: Uuid,
        year: i32,
        month: u32,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        due_date: Option<String>,
    },
    /// List bills
    List {
        #[arg(long)]
        year: Option<i32>,
        #[arg(long)]
        month: Option<u32>,
        /// Filter by status: pending, paid, skipped
        #[arg(long)]
        status: Option<String>,
    },
    /// Pay a bill
    Pay {
        id: Uuid,
        /// Funding product id
        #[arg(long)]
        from: Uuid,
        /// Amount paid (defaults to the bill amount)
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        date: Option<String>,
    },
    /// Skip a bill for its month
    Skip { id: Uuid },
    /// Edit a pending bill
    Edit {
        id: Uuid,
        #[arg(long)]
        amount: Option<String>,
        #[arg(long)]
        due_date: Option<String>,
    },
    /// Delete a bill
    Delete { id: Uuid },
}

/// Resolved invocation context shared by the sub-commands.
struct Session {
    service: LedgerService,
    owner: OwnerId,
    json: bool,
}

impl Cli {
    pub async fn run(self) -> Result<()> {
        let settings = Settings::load(self.config.as_deref()).context("Failed to load settings")?;
        let level = if self.verbose {
            "debug".to_string()
        } else {
            settings.log.level.clone()
        };
        init_tracing(&level);

        let database = self
            .database
            .clone()
            .unwrap_or_else(|| settings.database.path.clone());
        let owner = self.owner.or(settings.owner_id);

        let command = self.command;
        if let Commands::Init = command {
            let service = LedgerService::init(&database).await?;
            println!("Database initialized: {}", database);
            if let Some(owner) = owner {
                let seeded = service.seed_default_categories(owner).await?;
                println!("Seeded {} default categories for {}", seeded.len(), owner);
            }
            return Ok(());
        }

        let owner = owner.context(
            "No owner configured. Pass --owner, set owner_id in banquito.toml or BANQUITO__OWNER_ID",
        )?;
        let ctx = Session {
            service: LedgerService::connect(&database).await?,
            owner,
            json: self.json,
        };

        match command {
            // handled above
            Commands::Init => Ok(()),
            Commands::Category(cmd) => run_category_command(&ctx, cmd).await,
            Commands::Institution(cmd) => run_institution_command(&ctx, cmd).await,
            Commands::Product(cmd) => run_product_command(&ctx, cmd).await,
            Commands::Tx(cmd) => run_tx_command(&ctx, cmd).await,
            Commands::Transfer {
                amount,
                from,
                to,
                description,
                category,
                date,
            } => {
                let request = NewTransfer {
                    from_product_id: from,
                    to_product_id: to,
                    amount: parse_amount(&amount)?,
                    date: parse_date_or_now(date)?,
                    description,
                    category_id: category,
                };
                let row = ctx.service.record_transfer(ctx.owner, request).await?;
                if ctx.json {
                    return print_json(&row);
                }
                println!(
                    "Recorded transfer: {} ({})",
                    format_money(row.amount),
                    row.id
                );
                Ok(())
            }
            Commands::Summary(cmd) => run_summary_command(&ctx, cmd).await,
            Commands::Service(cmd) => run_service_command(&ctx, cmd).await,
            Commands::Bill(cmd) => run_bill_command(&ctx, cmd).await,
            Commands::Project { product, months } => {
                run_project_command(&ctx, product, months).await
            }
        }
    }
}

async fn run_category_command(ctx: &Session, cmd: CategoryCommands) -> Result<()> {
    match cmd {
        CategoryCommands::Add {
            name,
            category_type,
            icon,
        } => {
            let category_type = parse_enum(&category_type, "category type", CategoryType::from_str)?;
            let category = ctx
                .service
                .create_category(
                    ctx.owner,
                    NewCategory {
                        name,
                        icon,
                        category_type,
                    },
                )
                .await?;
            println!("Created category: {} ({})", category.name, category.id);
        }
        CategoryCommands::List { category_type } => {
            let category_type = category_type
                .map(|t| parse_enum(&t, "category type", CategoryType::from_str))
                .transpose()?;
            let categories = ctx.service.list_categories(ctx.owner, category_type).await?;
            if ctx.json {
                return print_json(&categories);
            }
            if categories.is_empty() {
                println!("No categories found.");
            } else {
                println!("{:<36} {:<4} {:<20} {:<8} {:<6}", "ID", "", "NAME", "TYPE", "SYSTEM");
                println!("{}", "-".repeat(78));
                for category in categories {
                    println!(
                        "{:<36} {:<4} {:<20} {:<8} {:<6}",
                        category.id,
                        category.icon.as_deref().unwrap_or(""),
                        truncate(&category.name, 20),
                        category.category_type,
                        if category.is_system { "yes" } else { "" }
                    );
                }
            }
        }
        CategoryCommands::Update { id, name, icon } => {
            let category = ctx
                .service
                .update_category(ctx.owner, id, CategoryUpdate { name, icon })
                .await?;
            println!("Updated category: {}", category.name);
        }
        CategoryCommands::Delete { id } => {
            let category = ctx.service.delete_category(ctx.owner, id).await?;
            println!("Deleted category: {}", category.name);
        }
        CategoryCommands::Seed => {
            let seeded = ctx.service.seed_default_categories(ctx.owner).await?;
            println!("Seeded {} default categories", seeded.len());
        }
    }
    Ok(())
}

async fn run_institution_command(ctx: &Session, cmd: InstitutionCommands) -> Result<()> {
    match cmd {
        InstitutionCommands::Add {
            name,
            institution_type,
            share_summary,
        } => {
            let institution_type =
                parse_enum(&institution_type, "institution type", InstitutionType::from_str)?;
            let institution = ctx
                .service
                .create_institution(
                    ctx.owner,
                    NewInstitution {
                        name,
                        institution_type,
                        share_summary,
                    },
                )
                .await?;
            println!("Created institution: {} ({})", institution.name, institution.id);
        }
        InstitutionCommands::List => {
            let institutions = ctx.service.list_institutions(ctx.owner).await?;
            if ctx.json {
                return print_json(&institutions);
            }
            if institutions.is_empty() {
                println!("No institutions found.");
            } else {
                println!("{:<36} {:<20} {:<8}", "ID", "NAME", "TYPE");
                println!("{}", "-".repeat(66));
                for institution in institutions {
                    println!(
                        "{:<36} {:<20} {:<8}",
                        institution.id,
                        truncate(&institution.name, 20),
                        institution.institution_type
                    );
                }
            }
        }
        InstitutionCommands::Update {
            id,
            name,
            share_summary,
        } => {
            let institution = ctx
                .service
                .update_institution(ctx.owner, id, InstitutionUpdate { name, share_summary })
                .await?;
            println!("Updated institution: {}", institution.name);
        }
        InstitutionCommands::Delete { id } => {
            let institution = ctx.service.delete_institution(ctx.owner, id).await?;
            println!("Deleted institution: {}", institution.name);
        }
    }
    Ok(())
}

async fn run_product_command(ctx: &Session, cmd: ProductCommands) -> Result<()> {
    match cmd {
        ProductCommands::Add {
            name,
            product_type,
            currency,
            institution,
            balance,
            linked,
            closing_day,
            due_day,
            limit,
            limit_single,
            limit_installments,
            unified,
            last_four,
            provider,
        } => {
            let limits = CreditLimits {
                limit_single_payment: limit_single.as_deref().map(parse_amount).transpose()?,
                limit_installments: limit_installments.as_deref().map(parse_amount).transpose()?,
                limit_amount: limit.as_deref().map(parse_amount).transpose()?,
                unified,
            };
            let request = NewProduct {
                institution_id: institution,
                balance: balance.as_deref().map(parse_signed_amount).transpose()?.unwrap_or_default(),
                linked_product_id: linked,
                closing_day,
                due_day,
                limits,
                last_four_digits: last_four,
                provider: provider
                    .map(|p| parse_enum(&p, "card provider", CardProvider::from_str))
                    .transpose()?,
                ..NewProduct::new(
                    name,
                    parse_enum(&product_type, "product type", ProductType::from_str)?,
                    parse_enum(&currency, "currency", Currency::from_str)?,
                )
            };
            let product = ctx.service.create_product(ctx.owner, request).await?;
            println!(
                "Created product: {} ({}, {}) {}",
                product.name, product.product_type, product.currency, product.id
            );
        }
        ProductCommands::List { institution } => {
            let products = ctx.service.list_products(ctx.owner, institution).await?;
            if ctx.json {
                return print_json(&products);
            }
            if products.is_empty() {
                println!("No products found.");
            } else {
                println!(
                    "{:<36} {:<20} {:<16} {:>12} {:<8}",
                    "ID", "NAME", "TYPE", "BALANCE", "CURRENCY"
                );
                println!("{}", "-".repeat(96));
                for product in products {
                    println!(
                        "{:<36} {:<20} {:<16} {:>12} {:<8}",
                        product.id,
                        truncate(&product.name, 20),
                        product.product_type,
                        format_money(product.balance),
                        product.currency
                    );
                }
            }
        }
        ProductCommands::Show { id } => {
            let info = ctx.service.get_product(ctx.owner, id).await?;
            if ctx.json {
                return print_json(&info);
            }
            let product = &info.product;
            println!("Product: {}", product.name);
            println!("  ID:             {}", product.id);
            println!("  Type:           {}", product.product_type);
            println!("  Currency:       {}", product.currency);
            println!("  Balance:        {}", format_money(product.balance));
            if let Some(linked) = product.linked_product_id {
                println!("  Linked account: {}", linked);
            }
            if let Some((closing, due)) = product.billing_days() {
                println!("  Closing day:    {}", closing);
                println!("  Due day:        {}", due);
            }
            if let Some(digits) = &product.last_four_digits {
                println!("  Card:           **** {}", digits);
            }
            for (pool, available) in &info.available_credit {
                println!("  Available ({}): {}", pool, format_money(*available));
            }
        }
        ProductCommands::Update {
            id,
            name,
            closing_day,
            due_day,
            last_four,
        } => {
            let changes = ProductUpdate {
                name,
                closing_day,
                due_day,
                last_four_digits: last_four,
                ..ProductUpdate::default()
            };
            let product = ctx.service.update_product(ctx.owner, id, changes).await?;
            println!("Updated product: {}", product.name);
        }
        ProductCommands::Delete { id } => {
            let product = ctx.service.delete_product(ctx.owner, id).await?;
            println!("Deleted product: {}", product.name);
        }
    }
    Ok(())
}

async fn run_tx_command(ctx: &Session, cmd: TxCommands) -> Result<()> {
    match cmd {
        TxCommands::Expense {
            product,
            amount,
            description,
            category,
            date,
            installments,
            plan_z,
        } => {
            let mut request =
                NewTransaction::expense(product, parse_amount(&amount)?, parse_date_or_now(date)?, description)
                    .with_installments(installments)
                    .with_plan_z(plan_z);
            request.category_id = category;
            let rows = ctx.service.create_transaction(ctx.owner, request).await?;
            if ctx.json {
                return print_json(&rows);
            }
            for row in rows {
                println!(
                    "Recorded expense: {} {} {} ({})",
                    row.date.format("%Y-%m-%d"),
                    format_money(row.amount),
                    row.description,
                    row.id
                );
            }
        }
        TxCommands::Income {
            product,
            amount,
            description,
            category,
            date,
        } => {
            let mut request =
                NewTransaction::income(product, parse_amount(&amount)?, parse_date_or_now(date)?, description);
            request.category_id = category;
            let rows = ctx.service.create_transaction(ctx.owner, request).await?;
            if ctx.json {
                return print_json(&rows);
            }
            for row in rows {
                println!("Recorded income: {} ({})", format_money(row.amount), row.id);
            }
        }
        TxCommands::List {
            product,
            category,
            transaction_type,
            limit,
        } => {
            let filter = TransactionFilter {
                product_id: product,
                category_id: category,
                transaction_type: transaction_type
                    .map(|t| parse_enum(&t, "transaction type", TransactionType::from_str))
                    .transpose()?,
                limit,
                offset: None,
            };
            let rows = ctx.service.list_transactions(ctx.owner, &filter).await?;
            if ctx.json {
                return print_json(&rows);
            }
            if rows.is_empty() {
                println!("No transactions found.");
            } else {
                println!(
                    "{:<12} {:<9} {:>12} {:<36} DESCRIPTION",
                    "DATE", "TYPE", "AMOUNT", "ID"
                );
                println!("{}", "-".repeat(100));
                for row in rows {
                    println!(
                        "{:<12} {:<9} {:>12} {:<36} {}",
                        row.date.format("%Y-%m-%d"),
                        row.transaction_type,
                        format_money(row.amount),
                        row.id,
                        truncate(&row.description, 30)
                    );
                }
            }
        }
        TxCommands::Show { id } => {
            let row = ctx.service.get_transaction(ctx.owner, id).await?;
            if ctx.json {
                return print_json(&row);
            }
            println!("Transaction: {}", row.id);
            println!("  Type:        {}", row.transaction_type);
            println!("  Amount:      {}", format_money(row.amount));
            println!("  Date:        {}", row.date.format("%Y-%m-%d %H:%M:%S"));
            println!("  Description: {}", row.description);
            if let Some(from) = row.from_product_id {
                println!("  From:        {}", from);
            }
            if let Some(to) = row.to_product_id {
                println!("  To:          {}", to);
            }
            if let Some(installment) = row.installment {
                println!(
                    "  Installment: {}/{} (group {})",
                    installment.number, installment.total, installment.group_id
                );
            }
            if row.plan_z {
                println!("  Plan Z:      yes");
            }
        }
        TxCommands::Edit {
            id,
            amount,
            date,
            description,
            category,
            plan_z,
        } => {
            let changes = TransactionUpdate {
                amount: amount.as_deref().map(parse_amount).transpose()?,
                date: date.as_deref().map(parse_date).transpose()?,
                description,
                category_id: category,
                plan_z,
            };
            let row = ctx.service.update_transaction(ctx.owner, id, changes).await?;
            println!("Updated transaction: {} {}", row.id, format_money(row.amount));
        }
        TxCommands::Delete { id } => {
            let row = ctx.service.delete_transaction(ctx.owner, id).await?;
            println!("Deleted transaction: {} {}", row.id, format_money(row.amount));
        }
    }
    Ok(())
}

async fn run_summary_command(ctx: &Session, cmd: SummaryCommands) -> Result<()> {
    match cmd {
        SummaryCommands::Generate {
            product,
            year,
            month,
        } => {
            let summary = ctx
                .service
                .generate_summary(ctx.owner, product, year, month)
                .await?;
            let detail = ctx.service.get_summary(ctx.owner, summary.id).await?;
            print_summary(ctx, &detail)?;
        }
        SummaryCommands::Current { product } => {
            let summary = ctx
                .service
                .current_summary(ctx.owner, product, Utc::now())
                .await?;
            let detail = ctx.service.get_summary(ctx.owner, summary.id).await?;
            print_summary(ctx, &detail)?;
        }
        SummaryCommands::List { product, status } => {
            let status = status
                .map(|s| parse_enum(&s, "summary status", SummaryStatus::from_str))
                .transpose()?;
            let summaries = ctx.service.list_summaries(ctx.owner, product, status).await?;
            if ctx.json {
                return print_json(&summaries);
            }
            if summaries.is_empty() {
                println!("No statements found.");
            } else {
                println!(
                    "{:<8} {:<8} {:>12} {:<12} {:<36}",
                    "PERIOD", "STATUS", "TOTAL", "DUE", "ID"
                );
                println!("{}", "-".repeat(80));
                for summary in summaries {
                    println!(
                        "{:<8} {:<8} {:>12} {:<12} {:<36}",
                        format!("{}-{:02}", summary.year, summary.month),
                        summary.status,
                        format_money(summary.total_amount),
                        summary.due_date,
                        summary.id
                    );
                }
            }
        }
        SummaryCommands::Show { id } => {
            let detail = ctx.service.get_summary(ctx.owner, id).await?;
            print_summary(ctx, &detail)?;
        }
        SummaryCommands::Adjust {
            id,
            adjustment_type,
            amount,
            description,
        } => {
            let request = NewAdjustment {
                adjustment_type: parse_enum(&adjustment_type, "adjustment type", AdjustmentType::from_str)?,
                description,
                amount: parse_amount(&amount)?,
            };
            let adjustment = ctx.service.add_summary_adjustment(ctx.owner, id, request).await?;
            println!(
                "Added {} adjustment: {} ({})",
                adjustment.adjustment_type,
                format_money(adjustment.amount),
                adjustment.id
            );
        }
        SummaryCommands::Unadjust { id, adjustment } => {
            let summary = ctx
                .service
                .delete_summary_adjustment(ctx.owner, id, adjustment)
                .await?;
            println!("Removed adjustment, total now {}", format_money(summary.total_amount));
        }
        SummaryCommands::Close { id } => {
            let summary = ctx.service.close_summary(ctx.owner, id).await?;
            println!(
                "Closed statement {}-{:02}: {}",
                summary.year,
                summary.month,
                format_money(summary.total_amount)
            );
        }
        SummaryCommands::Pay { id, from, date } => {
            let payment_date = date.as_deref().map(parse_date).transpose()?;
            let receipt = ctx
                .service
                .pay_summary(ctx.owner, id, from, payment_date)
                .await?;
            if ctx.json {
                return print_json(&receipt);
            }
            println!(
                "Paid statement {}-{:02}: {}",
                receipt.summary.year,
                receipt.summary.month,
                format_money(receipt.summary.total_amount)
            );
            if !receipt.restructured.is_empty() {
                println!(
                    "  Plan Z: {} purchase(s) restructured, {} deferred",
                    receipt.restructured.len(),
                    format_money(receipt.deferred_amount)
                );
            }
        }
        SummaryCommands::Reset { id } => {
            let summary = ctx.service.reset_summary(ctx.owner, id).await?;
            println!("Reset statement {}-{:02}", summary.year, summary.month);
        }
    }
    Ok(())
}

fn print_summary(ctx: &Session, detail: &crate::application::SummaryDetail) -> Result<()> {
    if ctx.json {
        return print_json(detail);
    }
    let summary = &detail.summary;
    println!("Statement {}-{:02} ({})", summary.year, summary.month, summary.status);
    println!("  ID:          {}", summary.id);
    println!("  Closing:     {}", summary.closing_date.format("%Y-%m-%d"));
    println!("  Due:         {}", summary.due_date);
    println!("  Purchases:   {}", format_money(summary.calculated_amount));
    println!("  Adjustments: {}", format_money(summary.adjustments_amount));
    println!("  Total:       {}", format_money(summary.total_amount));
    println!("  Items:       {}", detail.items.len());
    for adjustment in &detail.adjustments {
        println!(
            "    {:<12} {:>12} {}",
            adjustment.adjustment_type,
            format_money(adjustment.amount),
            adjustment.description
        );
    }
    Ok(())
}

async fn run_service_command(ctx: &Session, cmd: ServiceCommands) -> Result<()> {
    match cmd {
        ServiceCommands::Add {
            name,
            category,
            amount,
            due_day,
        } => {
            let request = NewService {
                name,
                category_id: category,
                default_amount: amount.as_deref().map(parse_amount).transpose()?,
                default_due_day: due_day,
            };
            let service = ctx.service.create_service(ctx.owner, request).await?;
            println!("Created service: {} ({})", service.name, service.id);
        }
        ServiceCommands::List { all } => {
            let services = ctx.service.list_services(ctx.owner, !all).await?;
            if ctx.json {
                return print_json(&services);
            }
            if services.is_empty() {
                println!("No services found.");
            } else {
                println!("{:<36} {:<20} {:>12} {:>4} {:<6}", "ID", "NAME", "AMOUNT", "DAY", "ACTIVE");
                println!("{}", "-".repeat(82));
                for service in services {
                    println!(
                        "{:<36} {:<20} {:>12} {:>4} {:<6}",
                        service.id,
                        truncate(&service.name, 20),
                        service.default_amount.map(format_money).unwrap_or_default(),
                        service
                            .default_due_day
                            .map(|d| d.to_string())
                            .unwrap_or_default(),
                        if service.is_active { "yes" } else { "no" }
                    );
                }
            }
        }
        ServiceCommands::Update {
            id,
            name,
            category,
            amount,
            due_day,
            active,
        } => {
            let changes = ServiceUpdate {
                name,
                category_id: category,
                default_amount: amount.as_deref().map(parse_amount).transpose()?,
                default_due_day: due_day,
                is_active: active,
            };
            let service = ctx.service.update_service(ctx.owner, id, changes).await?;
            println!("Updated service: {}", service.name);
        }
        ServiceCommands::Delete { id } => {
            let service = ctx.service.delete_service(ctx.owner, id).await?;
            println!("Deleted service: {}", service.name);
        }
    }
    Ok(())
}

async fn run_bill_command(ctx: &Session, cmd: BillCommands) -> Result<()> {
    match cmd {
        BillCommands::Month { year, month } => {
            let today = Utc::now().date_naive();
            let year = year.unwrap_or(today.year());
            let month = month.unwrap_or(today.month());
            let bills = ctx
                .service
                .get_or_create_monthly_bills(ctx.owner, year, month)
                .await?;
            print_bills(ctx, &bills)?;
        }
        BillCommands::Add {
            service,
            year,
            month,
            amount,
            due_date,
        } => {
            let request = NewBill {
                service_id: service,
                year,
                month,
                due_date: due_date.as_deref().map(parse_naive_date).transpose()?,
                amount: amount.as_deref().map(parse_amount).transpose()?,
            };
            let bill = ctx.service.create_bill(ctx.owner, request).await?;
            println!("Created bill: {} due {} ({})", format_money(bill.amount), bill.due_date, bill.id);
        }
        BillCommands::List {
            year,
            month,
            status,
        } => {
            let filter = BillFilter {
                year,
                month,
                status: status
                    .map(|s| parse_enum(&s, "bill status", BillStatus::from_str))
                    .transpose()?,
                service_id: None,
            };
            let bills = ctx.service.list_bills(ctx.owner, &filter).await?;
            print_bills(ctx, &bills)?;
        }
        BillCommands::Pay {
            id,
            from,
            amount,
            date,
        } => {
            let payment = BillPayment {
                product_id: from,
                amount: amount.as_deref().map(parse_amount).transpose()?,
                date: date.as_deref().map(parse_date).transpose()?,
            };
            let receipt = ctx.service.pay_bill(ctx.owner, id, payment).await?;
            if ctx.json {
                return print_json(&receipt);
            }
            println!(
                "Paid bill: {} ({})",
                format_money(receipt.transaction.amount),
                receipt.transaction.id
            );
        }
        BillCommands::Skip { id } => {
            let bill = ctx.service.skip_bill(ctx.owner, id).await?;
            println!("Skipped bill {}-{:02} ({})", bill.year, bill.month, bill.id);
        }
        BillCommands::Edit {
            id,
            amount,
            due_date,
        } => {
            let changes = BillUpdate {
                amount: amount.as_deref().map(parse_amount).transpose()?,
                due_date: due_date.as_deref().map(parse_naive_date).transpose()?,
            };
            let bill = ctx.service.update_bill(ctx.owner, id, changes).await?;
            println!("Updated bill: {} due {}", format_money(bill.amount), bill.due_date);
        }
        BillCommands::Delete { id } => {
            let bill = ctx.service.delete_bill(ctx.owner, id).await?;
            println!("Deleted bill {}-{:02} ({})", bill.year, bill.month, bill.id);
        }
    }
    Ok(())
}

fn print_bills(ctx: &Session, bills: &[crate::domain::ServiceBill]) -> Result<()> {
    if ctx.json {
        return print_json(&bills);
    }
    if bills.is_empty() {
        println!("No bills found.");
        return Ok(());
    }
    println!("{:<12} {:>12} {:<8} {:<36} {:<36}", "DUE", "AMOUNT", "STATUS", "SERVICE", "ID");
    println!("{}", "-".repeat(108));
    for bill in bills {
        println!(
            "{:<12} {:>12} {:<8} {:<36} {:<36}",
            bill.due_date,
            format_money(bill.amount),
            bill.status,
            bill.service_id,
            bill.id
        );
    }
    Ok(())
}

async fn run_project_command(ctx: &Session, product: Uuid, months: u32) -> Result<()> {
    let projections = ctx
        .service
        .project_summaries(ctx.owner, product, months, Utc::now())
        .await?;
    if ctx.json {
        return print_json(&projections);
    }
    println!("{:<8} {:>12} {:>6}", "PERIOD", "AMOUNT", "COUNT");
    println!("{}", "-".repeat(28));
    for projection in projections {
        println!(
            "{:<8} {:>12} {:>6}",
            format!("{}-{:02}", projection.year, projection.month),
            format_money(projection.amount),
            projection.transaction_count
        );
    }
    Ok(())
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn parse_enum<T>(value: &str, what: &str, parse: fn(&str) -> Option<T>) -> Result<T> {
    parse(value).with_context(|| format!("Unknown {}: '{}'", what, value))
}

/// Strictly positive amount with at most two decimals.
fn parse_amount(value: &str) -> Result<Money> {
    let amount = parse_signed_amount(value)?;
    if amount <= Money::ZERO {
        anyhow::bail!("Amount must be greater than zero: '{}'", value);
    }
    Ok(amount)
}

fn parse_signed_amount(value: &str) -> Result<Money> {
    parse_money(value).with_context(|| format!("Invalid amount '{}'. Use '50.00' or '50'", value))
}

fn truncate(s: &str, max_len: usize) -> String {
    if s.chars().count() <= max_len {
        s.to_string()
    } else {
        let kept: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", kept)
    }
}

fn parse_naive_date(date_str: &str) -> Result<NaiveDate> {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d")
        .with_context(|| format!("Invalid date format '{}'. Use YYYY-MM-DD", date_str))
}

/// Parse YYYY-MM-DD as midnight UTC.
fn parse_date(date_str: &str) -> Result<DateTime<Utc>> {
    let naive_datetime = parse_naive_date(date_str)?
        .and_hms_opt(0, 0, 0)
        .ok_or_else(|| anyhow::anyhow!("Invalid date"))?;
    Ok(naive_datetime.and_utc())
}

fn parse_date_or_now(date: Option<String>) -> Result<DateTime<Utc>> {
    match date {
        Some(date_str) => parse_date(&date_str),
        None => Ok(Utc::now()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use rust_decimal_macros::dec;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_amount() {
        assert_eq!(parse_amount("50").unwrap(), dec!(50));
        assert_eq!(parse_amount("12.34").unwrap(), dec!(12.34));
        assert!(parse_amount("0").is_err());
        assert!(parse_amount("-5").is_err());
        assert!(parse_amount("1.234").is_err());
        assert!(parse_amount("abc").is_err());
    }

    #[test]
    fn test_parse_date() {
        let date = parse_date("2024-02-29").unwrap();
        assert_eq!(date.format("%Y-%m-%d %H:%M:%S").to_string(), "2024-02-29 00:00:00");
        assert!(parse_date("2023-02-29").is_err());
        assert!(parse_date("29/02/2024").is_err());
    }

    #[test]
    fn test_truncate() {
        assert_eq!(truncate("short", 10), "short");
        assert_eq!(truncate("a very long description", 10), "a very ...");
    }
}
