// src/cmds/mod.rs

//! Subcommand registry and dispatch
//!
//! Commands register a set of alias names, an argument-count range and a
//! list of call forms. Repo-scoped commands receive a [`CommandContext`]
//! with the build history, repository and settings; application-level
//! commands (currently only `help`) run without one.

pub mod args;
pub mod diffing;
pub mod helpcmd;
pub mod importing;
pub mod listing;
pub mod showing;

use crate::error::{Error, Result};
use crate::history::BuildHistory;
use crate::repo::Repository;
use crate::settings::Settings;
use args::{describe_param, ParamKind};

/// Everything a repo-scoped command needs to run.
pub struct CommandContext<'r, 'db> {
    pub settings: &'r Settings,
    pub bh: &'r mut BuildHistory<'db>,
    pub repo: &'r Repository,
}

pub trait SubCommand {
    /// Alias names this command responds to.
    fn names(&self) -> &'static [&'static str];

    /// Description of one alias.
    ///
    /// Panics for aliases the command never declared; that's a registration
    /// bug, not an input error.
    fn description(&self, alias: &str) -> &'static str;

    /// Application-level commands don't need repository data.
    fn is_generic(&self) -> bool {
        false
    }

    /// Minimum and maximum accepted number of positional arguments.
    fn arg_bounds(&self) -> (usize, usize);

    /// Legal argument shapes, used for usage diagnostics.
    fn call_forms(&self) -> Vec<Vec<ParamKind>>;

    fn exec_generic(&self, _registry: &Registry, _alias: &str, _args: &[String]) -> Result<()> {
        panic!("not an application-level subcommand");
    }

    fn exec_repo(
        &self,
        _ctx: &mut CommandContext<'_, '_>,
        _alias: &str,
        _args: &[String],
    ) -> Result<()> {
        panic!("not a repository subcommand");
    }
}

/// Builds the usage error for a command invocation that matched no form.
pub fn usage_error(cmd: &dyn SubCommand, alias: &str) -> Error {
    let mut message = format!("Invalid arguments for subcommand '{alias}'.\n");
    message += "Valid invocation forms:\n";
    for form in cmd.call_forms() {
        message += &format!(" * uncov {alias}");
        for kind in form {
            message += &format!(" {}", describe_param(kind));
        }
        message.push('\n');
    }
    Error::Usage(message)
}

/// All registered commands.
pub struct Registry {
    cmds: Vec<Box<dyn SubCommand>>,
}

impl Registry {
    pub fn new() -> Self {
        Self {
            cmds: vec![
                Box::new(listing::BuildCmd),
                Box::new(listing::BuildsCmd),
                Box::new(diffing::DiffCmd),
                Box::new(listing::FilesCmd),
                Box::new(showing::GetCmd),
                Box::new(helpcmd::HelpCmd),
                Box::new(importing::NewCmd),
                Box::new(importing::NewGcoviCmd),
                Box::new(importing::NewJsonCmd),
                Box::new(showing::ShowCmd),
            ],
        }
    }

    pub fn find(&self, name: &str) -> Option<&dyn SubCommand> {
        self.cmds
            .iter()
            .map(Box::as_ref)
            .find(|cmd| cmd.names().contains(&name))
    }

    /// All `(alias, command)` pairs in alphabetical order.
    pub fn aliases(&self) -> Vec<(&'static str, &dyn SubCommand)> {
        let mut aliases: Vec<(&'static str, &dyn SubCommand)> = self
            .cmds
            .iter()
            .flat_map(|cmd| cmd.names().iter().map(move |name| (*name, cmd.as_ref())))
            .collect();
        aliases.sort_by_key(|(name, _)| *name);
        aliases
    }

    /// Validates the argument count before a command runs.
    pub fn check_arg_count(cmd: &dyn SubCommand, alias: &str, args: &[String]) -> Result<()> {
        let (min_args, max_args) = cmd.arg_bounds();
        if args.len() < min_args || args.len() > max_args {
            let expected = if min_args == max_args {
                format!("{min_args}")
            } else if max_args == usize::MAX {
                format!("at least {min_args}")
            } else {
                format!("{min_args}-{max_args}")
            };
            return Err(Error::Usage(format!(
                "Invalid number of arguments for subcommand '{alias}': \
                 got {}, expected {expected}.",
                args.len()
            )));
        }
        Ok(())
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
