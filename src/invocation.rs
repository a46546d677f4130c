// src/invocation.rs

//! Top-level argv parsing
//!
//! `uncov [--help|-h] [--version|-v] [repo-path] <subcommand> [args...]`
//!
//! Options are recognized only before the first positional argument;
//! everything after it belongs to the subcommand verbatim. The first
//! positional names the repository when it looks like a path (starts with
//! `.` or contains `/`), otherwise the repository defaults to `.`.

#[derive(Debug)]
pub struct Invocation {
    program_name: String,
    error: Option<String>,
    print_help: bool,
    print_version: bool,
    repository_path: String,
    subcommand_name: String,
    subcommand_args: Vec<String>,
}

impl Invocation {
    pub fn new(mut args: Vec<String>) -> Self {
        let program_name = if args.is_empty() {
            "uncov".to_string()
        } else {
            args.remove(0)
        };

        let mut invocation = Invocation {
            program_name,
            error: None,
            print_help: false,
            print_version: false,
            repository_path: String::new(),
            subcommand_name: String::new(),
            subcommand_args: Vec::new(),
        };

        if args.is_empty() {
            invocation.error = Some("No arguments.".to_string());
            return invocation;
        }

        // Collect options up to the first positional argument.
        let mut positionals = Vec::new();
        let mut args_iter = args.into_iter();
        for arg in args_iter.by_ref() {
            match arg.as_str() {
                "--help" | "-h" => invocation.print_help = true,
                "--version" | "-v" => invocation.print_version = true,
                _ if arg.starts_with('-') && arg.len() > 1 => {
                    invocation.error = Some(format!("Unrecognized option: {arg}"));
                    return invocation;
                }
                _ => {
                    positionals.push(arg);
                    break;
                }
            }
        }
        positionals.extend(args_iter);

        if invocation.print_help || invocation.print_version {
            return invocation;
        }

        let mut positionals = positionals.into_iter().peekable();

        // Extract path to repository.
        let looks_like_path =
            |s: &str| s.starts_with('.') || s.contains('/');
        invocation.repository_path = match positionals.peek() {
            Some(first) if looks_like_path(first) => positionals.next().unwrap(),
            _ => ".".to_string(),
        };

        match positionals.next() {
            Some(name) => invocation.subcommand_name = name,
            None => {
                invocation.error = Some("No subcommand specified.".to_string());
                return invocation;
            }
        }

        invocation.subcommand_args = positionals.collect();
        invocation
    }

    pub fn usage(&self) -> String {
        format!(
            "Usage: {} [--help|-h] [--version|-v] [repo] subcommand [args...]",
            self.program_name
        )
    }

    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    pub fn repository_path(&self) -> &str {
        &self.repository_path
    }

    pub fn subcommand_name(&self) -> &str {
        &self.subcommand_name
    }

    pub fn subcommand_args(&self) -> &[String] {
        &self.subcommand_args
    }

    pub fn should_print_help(&self) -> bool {
        self.print_help
    }

    pub fn should_print_version(&self) -> bool {
        self.print_version
    }
}
