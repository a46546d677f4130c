// src/cmds/helpcmd.rs

//! `help` subcommand

use super::args::{describe_param, try_parse, ParamKind};
use super::{usage_error, Registry, SubCommand};
use crate::error::{Error, Result};
use crate::table::TablePrinter;

/// Displays the help message.
pub struct HelpCmd;

impl SubCommand for HelpCmd {
    fn names(&self) -> &'static [&'static str] {
        &["help"]
    }

    fn description(&self, alias: &str) -> &'static str {
        match alias {
            "help" => "Displays help message",
            _ => panic!("undescribed alias: {alias}"),
        }
    }

    fn is_generic(&self) -> bool {
        true
    }

    fn arg_bounds(&self) -> (usize, usize) {
        (0, 1)
    }

    fn call_forms(&self) -> Vec<Vec<ParamKind>> {
        vec![vec![], vec![ParamKind::Path]]
    }

    fn exec_generic(&self, registry: &Registry, alias: &str, args: &[String]) -> Result<()> {
        if try_parse(args, &[]).is_some() {
            print_overview(registry);
            return Ok(());
        }

        let Some(parsed) = try_parse(args, &[ParamKind::Path]) else {
            return Err(usage_error(self, alias));
        };

        let name = parsed[0].as_path();
        let Some(cmd) = registry.find(name) else {
            return Err(Error::Usage(format!("Unknown subcommand: {name}")));
        };

        println!("{name}\n");
        println!("{}\n", cmd.description(name));
        println!("Valid invocation forms:");
        for form in cmd.call_forms() {
            let mut line = format!(" * uncov {name}");
            for kind in form {
                line += &format!(" {}", describe_param(kind));
            }
            println!("{line}");
        }
        Ok(())
    }
}

/// Prints the usage line and the table of all commands.
fn print_overview(registry: &Registry) {
    println!("Usage: uncov [--help|-h] [--version|-v] [repo] subcommand [args...]\n");
    println!("Subcommands");

    let mut table = TablePrinter::new(&["-Name", "-Description"], true);
    for (name, cmd) in registry.aliases() {
        table.append(vec![format!("   {name}"), cmd.description(name).to_string()]);
    }

    let stdout = std::io::stdout();
    let _ = table.print(&mut stdout.lock());
}
