/// Transaction Executor Tests
///
/// Driver grouping, atomic execution, commit ordering and unwinding.
/// Scripted drivers and step commands record every call in one shared log.
/// Run with: cargo test --test transaction_tests

use memorm::{
    Column, Command, CommandState, ContextualCommand, ContextualDeleteCommand, DataType, DbError,
    Driver, DriverEvent, DriverId, InsertCommand, MemoryDriver, MemoryTable, Result, Schema,
    Transaction, TransactionConfig, TransactionalCommand, UpdateCommand, Value, fields,
    forward_primary_key,
};
use std::sync::{Arc, Mutex};

type Log = Arc<Mutex<Vec<String>>>;

fn new_log() -> Log {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(log: &Log) -> Vec<String> {
    log.lock().unwrap().clone()
}

struct ScriptedDriver {
    id: DriverId,
    name: String,
    log: Log,
    fail_begin: bool,
    fail_commit: bool,
    fail_rollback: bool,
}

impl ScriptedDriver {
    fn new(name: &str, log: &Log) -> Self {
        Self {
            id: DriverId::next(),
            name: name.to_string(),
            log: log.clone(),
            fail_begin: false,
            fail_commit: false,
            fail_rollback: false,
        }
    }

    fn failing_begin(mut self) -> Self {
        self.fail_begin = true;
        self
    }

    fn failing_commit(mut self) -> Self {
        self.fail_commit = true;
        self
    }

    fn failing_rollback(mut self) -> Self {
        self.fail_rollback = true;
        self
    }

    fn record(&self, what: &str) {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, what));
    }
}

impl Driver for ScriptedDriver {
    fn id(&self) -> DriverId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn begin_transaction(&self) -> Result<()> {
        self.record("begin");
        if self.fail_begin {
            return Err(DbError::Transaction(format!("{} refused to begin", self.name)));
        }
        Ok(())
    }

    fn commit_transaction(&self) -> Result<()> {
        self.record("commit");
        if self.fail_commit {
            return Err(DbError::Transaction(format!("{} refused to commit", self.name)));
        }
        Ok(())
    }

    fn rollback_transaction(&self) -> Result<()> {
        self.record("rollback");
        if self.fail_rollback {
            return Err(DbError::Transaction(format!("{} lost its connection", self.name)));
        }
        Ok(())
    }
}

struct Step {
    name: String,
    driver: Option<Arc<dyn Driver>>,
    fail: bool,
    state: Mutex<CommandState>,
    log: Log,
}

impl Step {
    fn new(name: &str, driver: Option<Arc<dyn Driver>>, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            driver,
            fail: false,
            state: Mutex::new(CommandState::Pending),
            log: log.clone(),
        })
    }

    fn failing(name: &str, driver: Option<Arc<dyn Driver>>, log: &Log) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            driver,
            fail: true,
            state: Mutex::new(CommandState::Pending),
            log: log.clone(),
        })
    }

    fn step(&self, what: &str, to: CommandState) -> Result<()> {
        self.log.lock().unwrap().push(format!("{}:{}", self.name, what));
        let mut state = self.state.lock().unwrap();
        *state = state.transition(to, "step")?;
        Ok(())
    }
}

impl Command for Step {
    fn label(&self) -> &'static str {
        "step"
    }

    fn state(&self) -> CommandState {
        *self.state.lock().unwrap()
    }

    fn execute(&self) -> Result<()> {
        if self.fail {
            self.step("execute", CommandState::Failed)?;
            return Err(DbError::ExecutionError(format!("{} failed", self.name)));
        }
        self.step("execute", CommandState::Executed)
    }

    fn complete(&self) -> Result<()> {
        self.step("complete", CommandState::Completed)
    }

    fn rollback(&self) -> Result<()> {
        self.step("rollback", CommandState::RolledBack)
    }

    fn driver(&self) -> Option<Arc<dyn Driver>> {
        self.driver.clone()
    }
}

fn queue(transaction: &mut Transaction, step: &Arc<Step>) {
    transaction.add_command(step.clone() as Arc<dyn Command>);
}

fn blog() -> (Arc<MemoryDriver>, Arc<MemoryTable>, Arc<MemoryTable>) {
    let driver = MemoryDriver::new("blog");
    let users = driver
        .create_table(Schema::new(
            "users",
            vec![Column::new("name", DataType::Text).not_null()],
        ))
        .unwrap();
    let posts = driver
        .create_table(Schema::new(
            "posts",
            vec![
                Column::new("author_id", DataType::Integer).not_null(),
                Column::new("title", DataType::Text),
            ],
        ))
        .unwrap();
    (driver, users, posts)
}

#[test]
fn test_all_success_completes_in_order() {
    let log = new_log();
    let driver: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("db", &log));
    let steps: Vec<_> = (1..=3)
        .map(|i| Step::new(&format!("c{}", i), Some(driver.clone()), &log))
        .collect();

    let mut transaction = Transaction::new();
    for step in &steps {
        queue(&mut transaction, step);
    }
    transaction.run().unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "db:begin",
            "c1:execute",
            "c2:execute",
            "c3:execute",
            "db:commit",
            "c1:complete",
            "c2:complete",
            "c3:complete",
        ]
    );
    assert!(steps.iter().all(|p| p.state() == CommandState::Completed));
    assert!(transaction.is_empty());
}

#[test]
fn test_failure_rolls_back_executed_in_reverse() {
    let log = new_log();
    let driver: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("db", &log));

    let mut transaction = Transaction::new();
    let mut steps = Vec::new();
    for i in 1..=4 {
        let step = Step::new(&format!("c{}", i), Some(driver.clone()), &log);
        queue(&mut transaction, &step);
        steps.push(step);
    }
    let failing = Step::failing("c5", Some(driver.clone()), &log);
    queue(&mut transaction, &failing);
    let never = Step::new("c6", Some(driver), &log);
    queue(&mut transaction, &never);

    let err = transaction.run_with(false, false).unwrap_err();
    assert!(matches!(err, DbError::ExecutionError(ref msg) if msg == "c5 failed"));

    assert_eq!(
        entries(&log),
        vec![
            "db:begin",
            "c1:execute",
            "c2:execute",
            "c3:execute",
            "c4:execute",
            "c5:execute",
            "db:rollback",
            "c4:rollback",
            "c3:rollback",
            "c2:rollback",
            "c1:rollback",
        ]
    );
    assert!(steps.iter().all(|p| p.state() == CommandState::RolledBack));
    assert_eq!(failing.state(), CommandState::Failed);
    assert_eq!(never.state(), CommandState::Pending);
    assert!(transaction.is_empty(), "aborted batches are always discarded");
}

#[test]
fn test_drivers_begin_in_order_and_commit_in_reverse() {
    let log = new_log();
    let first: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("first", &log));
    let second: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("second", &log));

    let mut transaction = Transaction::new();
    queue(&mut transaction, &Step::new("a", Some(first.clone()), &log));
    queue(&mut transaction, &Step::new("b", Some(second), &log));
    queue(&mut transaction, &Step::new("c", Some(first), &log));
    queue(&mut transaction, &Step::new("d", None, &log));
    transaction.run().unwrap();

    assert_eq!(
        entries(&log),
        vec![
            "first:begin",
            "second:begin",
            "a:execute",
            "b:execute",
            "c:execute",
            "d:execute",
            "second:commit",
            "first:commit",
            "a:complete",
            "b:complete",
            "c:complete",
            "d:complete",
        ]
    );
}

#[test]
fn test_single_command_skips_transaction_unless_forced() {
    let log = new_log();
    let driver: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("db", &log));

    let mut transaction = Transaction::new();
    queue(&mut transaction, &Step::new("solo", Some(driver.clone()), &log));
    transaction.run().unwrap();
    assert_eq!(entries(&log), vec!["solo:execute", "solo:complete"]);

    log.lock().unwrap().clear();
    queue(&mut transaction, &Step::new("forced", Some(driver), &log));
    transaction.run_with(true, true).unwrap();
    assert_eq!(
        entries(&log),
        vec!["db:begin", "forced:execute", "db:commit", "forced:complete"]
    );
}

#[test]
fn test_forced_transaction_from_config() {
    let (driver, users, _posts) = blog();
    let mut transaction =
        Transaction::with_config(TransactionConfig::new().force_transaction(true));
    transaction.add_command(InsertCommand::new(users, fields! { "name" => "solo" }));

    transaction.run().unwrap();
    assert_eq!(
        driver.journal().unwrap(),
        vec![DriverEvent::Begin, DriverEvent::Commit]
    );
}

#[test]
fn test_empty_commands_run_without_transactions() {
    let (driver, users, _posts) = blog();
    let update = UpdateCommand::new(users.clone(), fields! { "id" => 1 }, fields! {});
    let delete = ContextualDeleteCommand::new(users, fields! {});

    assert!(update.is_empty().unwrap());
    assert!(delete.is_empty().unwrap());

    let mut transaction = Transaction::new();
    transaction.add_command(update.clone());
    transaction.add_command(delete.clone());
    transaction.run().unwrap();

    assert_eq!(update.state(), CommandState::Completed);
    assert_eq!(delete.state(), CommandState::Completed);
    assert_eq!(update.affected_rows(), None);
    assert!(driver.journal().unwrap().is_empty());
}

#[test]
fn test_user_and_post_share_one_transaction() -> anyhow::Result<()> {
    let (driver, users, posts) = blog();

    let user = InsertCommand::new(users.clone(), fields! { "name" => "Alice" });
    let post = InsertCommand::new(posts.clone(), fields! { "title" => "Hello" });
    forward_primary_key(&user, post.clone(), "author_id")?;

    let mut transaction = Transaction::new();
    transaction.add_command(user.clone());
    transaction.add_command(post.clone());
    transaction.run()?;

    let user_id = user.insert_id().expect("user key assigned");
    let stored = posts.find(&fields! { "title" => "Hello" })?;
    assert_eq!(stored.len(), 1);
    assert_eq!(stored[0]["author_id"], user_id);
    assert_eq!(users.count()?, 1);
    assert_eq!(
        driver.journal()?,
        vec![DriverEvent::Begin, DriverEvent::Commit]
    );
    Ok(())
}

#[test]
fn test_promise_across_drivers() -> anyhow::Result<()> {
    let accounts = MemoryDriver::new("accounts");
    let audit = MemoryDriver::new("audit");
    let users = accounts.create_table(Schema::new(
        "users",
        vec![Column::new("name", DataType::Text)],
    ))?;
    let audit_entries = audit.create_table(Schema::new(
        "entries",
        vec![
            Column::new("user_id", DataType::Integer).not_null(),
            Column::new("action", DataType::Text),
        ],
    ))?;

    let user = InsertCommand::new(users, fields! { "name" => "Bob" });
    let entry = InsertCommand::new(audit_entries.clone(), fields! { "action" => "signup" });
    forward_primary_key(&user, entry.clone(), "user_id")?;

    let graph = TransactionalCommand::new();
    graph.add_command(user.clone(), true)?;
    graph.add_command(entry, false)?;

    let mut transaction = Transaction::new();
    transaction.add_command(graph);
    transaction.run()?;

    assert_eq!(audit_entries.rows()?[0]["user_id"], Value::Integer(1));
    assert_eq!(accounts.journal()?, vec![DriverEvent::Begin, DriverEvent::Commit]);
    assert_eq!(audit.journal()?, vec![DriverEvent::Begin, DriverEvent::Commit]);
    Ok(())
}

#[test]
fn test_storage_failure_reverts_rows() {
    let (driver, users, posts) = blog();
    let user = InsertCommand::new(users.clone(), fields! { "name" => "Carol" });
    // author_id is never bound, so the post violates NOT NULL
    let post = InsertCommand::new(posts.clone(), fields! { "title" => "orphan" });

    let rolled_back = Arc::new(Mutex::new(false));
    let flag = rolled_back.clone();
    user.on_rollback(move |_| {
        *flag.lock().unwrap() = true;
        Ok(())
    });

    let mut transaction = Transaction::new();
    transaction.add_command(user.clone());
    transaction.add_command(post.clone());

    let err = transaction.run().unwrap_err();
    assert!(matches!(err, DbError::ConstraintViolation(_)));
    assert!(*rolled_back.lock().unwrap());
    assert_eq!(user.state(), CommandState::RolledBack);
    assert_eq!(post.state(), CommandState::Failed);
    assert_eq!(users.count().unwrap(), 0);
    assert_eq!(posts.count().unwrap(), 0);
    assert_eq!(
        driver.journal().unwrap(),
        vec![DriverEvent::Begin, DriverEvent::Rollback]
    );
}

#[test]
fn test_driver_rollback_failure_is_swallowed() {
    let log = new_log();
    let broken: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("broken", &log).failing_rollback());
    let healthy: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("healthy", &log));

    let mut transaction = Transaction::new();
    let first = Step::new("a", Some(healthy), &log);
    queue(&mut transaction, &first);
    queue(&mut transaction, &Step::failing("b", Some(broken), &log));

    let err = transaction.run().unwrap_err();
    assert!(matches!(err, DbError::ExecutionError(ref msg) if msg == "b failed"));
    assert_eq!(
        entries(&log),
        vec![
            "healthy:begin",
            "broken:begin",
            "a:execute",
            "b:execute",
            "broken:rollback",
            "healthy:rollback",
            "a:rollback",
        ]
    );
    assert_eq!(first.state(), CommandState::RolledBack);
}

#[test]
fn test_begin_failure_rolls_back_opened_drivers_only() {
    let log = new_log();
    let a: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("a", &log));
    let b: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("b", &log).failing_begin());
    let c: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("c", &log));

    let mut transaction = Transaction::new();
    let steps = vec![
        Step::new("first", Some(a), &log),
        Step::new("second", Some(b), &log),
        Step::new("third", Some(c), &log),
    ];
    for step in &steps {
        queue(&mut transaction, step);
    }

    let err = transaction.run().unwrap_err();
    assert!(matches!(err, DbError::Transaction(ref msg) if msg == "b refused to begin"));
    assert_eq!(entries(&log), vec!["a:begin", "b:begin", "a:rollback"]);
    assert!(steps.iter().all(|step| step.state() == CommandState::Pending));
    assert!(transaction.is_empty());
}

#[test]
fn test_commit_failure_unwinds_uncommitted_drivers() {
    let log = new_log();
    let first: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("first", &log));
    let second: Arc<dyn Driver> = Arc::new(ScriptedDriver::new("second", &log).failing_commit());

    let mut transaction = Transaction::new();
    let a = Step::new("a", Some(first), &log);
    let b = Step::new("b", Some(second), &log);
    queue(&mut transaction, &a);
    queue(&mut transaction, &b);

    let err = transaction.run_with(false, false).unwrap_err();
    assert!(matches!(err, DbError::Transaction(_)));
    assert_eq!(
        entries(&log),
        vec![
            "first:begin",
            "second:begin",
            "a:execute",
            "b:execute",
            "second:commit",
            "second:rollback",
            "first:rollback",
            "b:rollback",
            "a:rollback",
        ]
    );
    assert_eq!(a.state(), CommandState::RolledBack);
    assert_eq!(b.state(), CommandState::RolledBack);
    assert!(transaction.is_empty());
}

#[test]
fn test_completion_errors_do_not_stop_other_completions() {
    let (_driver, users, _posts) = blog();
    let first = InsertCommand::new(users.clone(), fields! { "name" => "first" });
    let second = InsertCommand::new(users.clone(), fields! { "name" => "second" });
    first.on_complete(|_| Err(DbError::ExecutionError("listener failed".into())));

    let mut transaction = Transaction::new();
    transaction.add_command(first.clone());
    transaction.add_command(second.clone());

    let err = transaction.run().unwrap_err();
    assert!(matches!(err, DbError::ExecutionError(ref msg) if msg == "listener failed"));
    assert_eq!(first.state(), CommandState::Completed);
    assert_eq!(second.state(), CommandState::Completed);
    assert_eq!(users.count().unwrap(), 2);
}

#[test]
fn test_clean_flag_keeps_commands() {
    let (_driver, users, _posts) = blog();
    let mut transaction = Transaction::new();
    transaction.add_command(InsertCommand::new(users, fields! { "name" => "kept" }));

    transaction.run_with(false, false).unwrap();
    assert_eq!(transaction.len(), 1);
    assert_eq!(transaction.commands()[0].state(), CommandState::Completed);

    // a second run hits the already executed command
    let err = transaction.run().unwrap_err();
    assert!(matches!(err, DbError::InvalidState(_)));
    assert!(transaction.is_empty());
}

#[test]
fn test_transaction_drops_null_commands() {
    let mut transaction = Transaction::new();
    transaction.add_command(memorm::NullCommand);
    transaction.add_command(TransactionalCommand::new());

    assert_eq!(transaction.len(), 1);
    assert!(transaction.commands().is_empty());
    transaction.run().unwrap();
    assert!(transaction.is_empty());
}
