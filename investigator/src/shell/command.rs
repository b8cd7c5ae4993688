//! Command line parsing
//!
//! `<keyword> [target] [search phrase...]`, whitespace separated. The keyword
//! is case-insensitive; the rest is kept as typed.

/// A parsed shell command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Help,
    /// `list [true|false]`
    List { command_line: bool },
    /// `stack <pid|name> [search phrase...]`
    Stack { target: Option<String>, search: Option<String> },
    /// `heap <pid|name> [search phrase...]`
    Heap { target: Option<String>, search: Option<String> },
    /// `threadpool <pid|name>`; listed in help, not implemented
    ThreadPool { target: Option<String> },
    /// `save <pid|name> <file>`
    Save { target: Option<String>, path: Option<String> },
    Quit,
    /// Blank line
    Empty,
    Unknown(String),
}

impl Command {
    #[must_use]
    pub fn parse(line: &str) -> Self {
        let mut tokens = line.split_whitespace();
        let Some(keyword) = tokens.next() else {
            return Command::Empty;
        };
        let target = tokens.next().map(str::to_string);
        let rest: Vec<&str> = tokens.collect();
        let search = if rest.is_empty() { None } else { Some(rest.join(" ")) };

        match keyword.to_lowercase().as_str() {
            "?" | "help" => Command::Help,
            "list" => Command::List {
                command_line: target.as_deref().is_some_and(|t| t.eq_ignore_ascii_case("true")),
            },
            "stack" => Command::Stack { target, search },
            "heap" => Command::Heap { target, search },
            "threadpool" => Command::ThreadPool { target },
            "save" => Command::Save { target, path: search },
            "quit" | "exit" => Command::Quit,
            other => Command::Unknown(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_is_case_insensitive() {
        assert_eq!(Command::parse("HELP"), Command::Help);
        assert_eq!(Command::parse("?"), Command::Help);
        assert_eq!(Command::parse("Exit"), Command::Quit);
    }

    #[test]
    fn test_stack_with_search_phrase() {
        assert_eq!(
            Command::parse("stack orders.api  Monitor.Wait  timeout"),
            Command::Stack {
                target: Some("orders.api".to_string()),
                search: Some("Monitor.Wait timeout".to_string()),
            }
        );
    }

    #[test]
    fn test_heap_without_search() {
        assert_eq!(
            Command::parse("heap 1234"),
            Command::Heap { target: Some("1234".to_string()), search: None }
        );
    }

    #[test]
    fn test_missing_target() {
        assert_eq!(Command::parse("stack"), Command::Stack { target: None, search: None });
    }

    #[test]
    fn test_list_flag() {
        assert_eq!(Command::parse("list"), Command::List { command_line: false });
        assert_eq!(Command::parse("list TRUE"), Command::List { command_line: true });
        assert_eq!(Command::parse("list false"), Command::List { command_line: false });
    }

    #[test]
    fn test_save_keeps_path_tokens() {
        assert_eq!(
            Command::parse("save orders.api /tmp/orders dump.json"),
            Command::Save {
                target: Some("orders.api".to_string()),
                path: Some("/tmp/orders dump.json".to_string()),
            }
        );
    }

    #[test]
    fn test_blank_and_unknown() {
        assert_eq!(Command::parse("   "), Command::Empty);
        assert_eq!(Command::parse("dump 1"), Command::Unknown("dump".to_string()));
    }
}
