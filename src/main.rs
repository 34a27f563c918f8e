use anyhow::{Context, Result, anyhow};
use clap::Parser;
use memorm::{
    CallbackCommand, Column, DataType, DbError, InsertCommand, MemoryDriver, Schema,
    Transaction, TransactionConfig, TransactionalCommand, fields, forward_primary_key,
};
use serde_json::json;

#[derive(Parser)]
#[command(name = "memorm")]
#[command(about = "Run a user/post command graph against the in-memory driver")]
struct Cli {
    /// Users to insert
    #[arg(long, default_value_t = 2)]
    users: usize,

    /// Posts queued for every user, each bound to its author's new key
    #[arg(long, default_value_t = 2)]
    posts: usize,

    /// Fail the batch right after the graph of this user (1-based)
    #[arg(long)]
    fail_at: Option<usize>,

    /// Open a driver transaction even for a single command
    #[arg(long)]
    force_transaction: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let driver = MemoryDriver::new("primary");
    let users = driver.create_table(Schema::new(
        "users",
        vec![Column::new("name", DataType::Text).not_null()],
    ))?;
    let posts = driver.create_table(Schema::new(
        "posts",
        vec![
            Column::new("author_id", DataType::Integer).not_null(),
            Column::new("title", DataType::Text),
        ],
    ))?;

    let mut transaction =
        Transaction::with_config(TransactionConfig::new().force_transaction(cli.force_transaction));

    for user in 1..=cli.users {
        let graph = TransactionalCommand::new();
        let author = InsertCommand::new(users.clone(), fields! { "name" => format!("user {}", user) });
        graph.add_command(author.clone(), true)?;

        for post in 1..=cli.posts {
            let insert = InsertCommand::new(
                posts.clone(),
                fields! { "title" => format!("post {} by user {}", post, user) },
            );
            forward_primary_key(&author, insert.clone(), "author_id")?;
            graph.add_command(insert, false)?;
        }
        transaction.add_command(graph);

        if cli.fail_at == Some(user) {
            transaction.add_command(CallbackCommand::new(move || {
                Err(DbError::ExecutionError(format!("checkpoint after user {}", user)))
            }));
        }
    }

    let outcome = transaction.run();

    let status = match &outcome {
        Ok(()) => "committed".to_string(),
        Err(err) => format!("failed: {}", err),
    };
    let report = json!({
        "status": status,
        "journal": driver.journal()?,
        "users": users.rows()?,
        "posts": posts.rows()?,
    });
    let rendered = serde_json::to_string_pretty(&report).context("Failed to render report")?;
    println!("{}", rendered);

    outcome.map_err(|err| anyhow!("transaction failed: {}", err))?;
    Ok(())
}
