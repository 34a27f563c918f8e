use super::Persistable;
use crate::command::{Command, CommandNode};
use crate::config::TransactionConfig;
use crate::core::Result;
use crate::storage::{Driver, DriverId};
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{Level, event, info_span};

/// Ordered set of top-level commands applied together by [`Transaction::run`].
#[derive(Debug, Default)]
pub struct Transaction {
    commands: Vec<CommandNode>,
    config: TransactionConfig,
}

impl Transaction {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: TransactionConfig) -> Self {
        Self {
            commands: Vec::new(),
            config,
        }
    }

    pub fn config(&self) -> TransactionConfig {
        self.config
    }

    /// Queue a top-level command; `NullCommand` is dropped
    pub fn add_command(&mut self, command: impl Into<CommandNode>) {
        let command = command.into();
        if !command.is_null() {
            self.commands.push(command);
        }
    }

    /// Queue the writes of `record`
    pub fn store(&mut self, record: &mut dyn Persistable, queue_relations: bool) -> Result<()> {
        let command = record.queue_store(queue_relations)?;
        self.add_command(command);
        Ok(())
    }

    /// Queue the deletion of `record`
    pub fn delete(&mut self, record: &mut dyn Persistable) -> Result<()> {
        let command = record.queue_delete()?;
        self.add_command(command);
        Ok(())
    }

    /// Flattened leaves of every queued command, in execution order
    pub fn commands(&self) -> Vec<Arc<dyn Command>> {
        let mut leaves = Vec::new();
        for command in &self.commands {
            command.flatten_into(&mut leaves);
        }
        leaves
    }

    /// Number of queued top-level commands
    pub fn len(&self) -> usize {
        self.commands.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands.is_empty()
    }

    pub fn clear(&mut self) {
        self.commands.clear();
    }

    /// Run with the stored configuration
    pub fn run(&mut self) -> Result<()> {
        let TransactionConfig {
            force_transaction,
            clean,
        } = self.config;
        self.run_with(force_transaction, clean)
    }

    /// Apply every queued command atomically.
    ///
    /// Driver transactions are opened only when more than one command runs,
    /// or when `force_transaction` is set. On failure every executed command
    /// is rolled back and the queue is discarded regardless of `clean`.
    pub fn run_with(&mut self, force_transaction: bool, clean: bool) -> Result<()> {
        let commands = self.commands();
        let drivers = distinct_drivers(&commands);

        let span = info_span!(
            "transaction_run",
            commands = commands.len(),
            drivers = drivers.len(),
            force_transaction,
            clean
        );
        let _enter = span.enter();

        if commands.is_empty() {
            event!(Level::DEBUG, "nothing to run");
            if clean {
                self.commands.clear();
            }
            return Ok(());
        }

        let mut opened: Vec<Arc<dyn Driver>> = Vec::new();
        let mut executed: Vec<Arc<dyn Command>> = Vec::new();

        if let Err(err) = execute_all(
            &commands,
            &drivers,
            force_transaction || commands.len() > 1,
            &mut opened,
            &mut executed,
        ) {
            event!(Level::ERROR, error = %err, executed = executed.len(), "transaction aborted");
            rollback_drivers(opened.iter().rev());
            rollback_commands(&executed);
            self.commands.clear();
            return Err(err);
        }

        let mut pending = opened.iter().rev();
        while let Some(driver) = pending.next() {
            if let Err(err) = driver.commit_transaction() {
                event!(Level::ERROR, driver = %driver.id(), error = %err, "commit failed");
                rollback_drivers(std::iter::once(driver).chain(pending));
                rollback_commands(&executed);
                self.commands.clear();
                return Err(err);
            }
            event!(Level::DEBUG, driver = %driver.id(), name = driver.name(), "committed");
        }

        let mut first_error = None;
        for command in &executed {
            if let Err(err) = command.complete() {
                event!(Level::ERROR, command = command.label(), error = %err, "complete failed");
                first_error.get_or_insert(err);
            }
        }

        if clean {
            self.commands.clear();
        }

        match first_error {
            Some(err) => Err(err),
            None => {
                event!(Level::DEBUG, executed = executed.len(), "transaction completed");
                Ok(())
            }
        }
    }
}

/// Drivers touched by `commands`, first-seen order
fn distinct_drivers(commands: &[Arc<dyn Command>]) -> Vec<Arc<dyn Driver>> {
    let mut seen: HashSet<DriverId> = HashSet::new();
    commands
        .iter()
        .filter_map(|command| command.driver())
        .filter(|driver| seen.insert(driver.id()))
        .collect()
}

fn execute_all(
    commands: &[Arc<dyn Command>],
    drivers: &[Arc<dyn Driver>],
    wrap: bool,
    opened: &mut Vec<Arc<dyn Driver>>,
    executed: &mut Vec<Arc<dyn Command>>,
) -> Result<()> {
    if wrap {
        for driver in drivers {
            driver.begin_transaction()?;
            event!(Level::DEBUG, driver = %driver.id(), name = driver.name(), "begin");
            opened.push(driver.clone());
        }
    }

    for command in commands {
        command.execute()?;
        event!(Level::DEBUG, command = command.label(), "executed");
        executed.push(command.clone());
    }
    Ok(())
}

fn rollback_drivers<'a>(drivers: impl Iterator<Item = &'a Arc<dyn Driver>>) {
    for driver in drivers {
        if let Err(err) = driver.rollback_transaction() {
            event!(
                Level::WARN,
                driver = %driver.id(),
                error = %err,
                "driver rollback failed"
            );
        }
    }
}

fn rollback_commands(executed: &[Arc<dyn Command>]) {
    for command in executed.iter().rev() {
        if let Err(err) = command.rollback() {
            event!(
                Level::WARN,
                command = command.label(),
                error = %err,
                "command rollback failed"
            );
        }
    }
}
