//! Admin console on stdin.
//!
//! One command per line. Replies go to stdout, failures are logged and the
//! console keeps reading.

use anyhow::{anyhow, bail, Context};
use serde_json::Value;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info};
use zenith_core::{ConfigRegistry, Database, Partition, PlayerStore, SteamId};

const HELP: &str = "\
join <steamid> <name>                           activate a player
leave <steamid>                                 save and drop a player
get <steamid> <namespace> <key> [settings]      read a cached value
set <steamid> <namespace> <key> <json> [settings]  write a cached value
save [steamid]                                  save one player or everyone
reload                                          reload every config file
configs [all]                                   list config entries
purge [days]                                    delete stale players now
quit                                            shut the host down";

/// A parsed console line
#[derive(Debug, Clone, PartialEq)]
pub enum ConsoleCommand {
    Join { steam_id: SteamId, name: String },
    Leave(SteamId),
    Get {
        steam_id: SteamId,
        namespace: String,
        key: String,
        partition: Partition,
    },
    Set {
        steam_id: SteamId,
        namespace: String,
        key: String,
        value: Value,
        partition: Partition,
    },
    Save(Option<SteamId>),
    Reload,
    Configs { show_protected: bool },
    Purge(Option<u32>),
    Help,
    Quit,
}

/// Why the console stopped reading
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleExit {
    Quit,
    Closed,
}

impl ConsoleCommand {
    /// Parses one line. Blank lines yield `None`.
    pub fn parse(line: &str) -> anyhow::Result<Option<Self>> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(None);
        };
        let args: Vec<&str> = words.collect();

        let command = match verb.to_ascii_lowercase().as_str() {
            "join" => {
                if args.len() < 2 {
                    bail!("usage: join <steamid> <name>");
                }
                ConsoleCommand::Join {
                    steam_id: steam_id(args[0])?,
                    name: args[1..].join(" "),
                }
            }
            "leave" => ConsoleCommand::Leave(steam_id(args.first().copied().unwrap_or_default())?),
            "get" => {
                if !(3..=4).contains(&args.len()) {
                    bail!("usage: get <steamid> <namespace> <key> [settings|storage]");
                }
                ConsoleCommand::Get {
                    steam_id: steam_id(args[0])?,
                    namespace: args[1].to_string(),
                    key: args[2].to_string(),
                    partition: partition(args.get(3).copied())?,
                }
            }
            "set" => {
                if !(4..=5).contains(&args.len()) {
                    bail!("usage: set <steamid> <namespace> <key> <json> [settings|storage]");
                }
                ConsoleCommand::Set {
                    steam_id: steam_id(args[0])?,
                    namespace: args[1].to_string(),
                    key: args[2].to_string(),
                    value: literal(args[3]),
                    partition: partition(args.get(4).copied())?,
                }
            }
            "save" => ConsoleCommand::Save(args.first().copied().map(steam_id).transpose()?),
            "reload" => ConsoleCommand::Reload,
            "configs" => ConsoleCommand::Configs {
                show_protected: args.first() == Some(&"all"),
            },
            "purge" => ConsoleCommand::Purge(
                args.first()
                    .map(|days| days.parse::<u32>().with_context(|| format!("invalid day count '{}'", days)))
                    .transpose()?,
            ),
            "help" | "?" => ConsoleCommand::Help,
            "quit" | "exit" => ConsoleCommand::Quit,
            other => bail!("unknown command '{}', try 'help'", other),
        };
        Ok(Some(command))
    }
}

fn steam_id(text: &str) -> anyhow::Result<SteamId> {
    text.parse::<SteamId>()
        .with_context(|| format!("invalid steam id '{}'", text))
}

fn partition(text: Option<&str>) -> anyhow::Result<Partition> {
    match text.map(str::to_ascii_lowercase).as_deref() {
        None | Some("storage") => Ok(Partition::Storage),
        Some("settings") => Ok(Partition::Settings),
        Some(other) => Err(anyhow!("unknown partition '{}'", other)),
    }
}

/// JSON when it parses, otherwise the raw text as a string.
fn literal(text: &str) -> Value {
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}

/// Services the console commands act on
#[derive(Clone)]
pub struct Console {
    store: PlayerStore,
    registry: ConfigRegistry,
    db: Database,
}

impl Console {
    pub fn new(store: PlayerStore, registry: ConfigRegistry, db: Database) -> Self {
        Self { store, registry, db }
    }

    /// Runs one command and returns its reply.
    pub async fn execute(&self, command: ConsoleCommand) -> anyhow::Result<String> {
        match command {
            ConsoleCommand::Join { steam_id, name } => {
                self.store.load(steam_id, &name).await?;
                Ok(format!("{} ({}) joined", name, steam_id))
            }
            ConsoleCommand::Leave(steam_id) => {
                self.store.dispose(steam_id).await?;
                Ok(format!("{} left", steam_id))
            }
            ConsoleCommand::Get {
                steam_id,
                namespace,
                key,
                partition,
            } => {
                if !self.store.is_active(steam_id) {
                    bail!("{} is not active", steam_id);
                }
                Ok(match self.store.get::<Value>(steam_id, &namespace, &key, partition) {
                    Some(value) => value.to_string(),
                    None => format!("{} has no {}/{} in {}", steam_id, namespace, key, partition),
                })
            }
            ConsoleCommand::Set {
                steam_id,
                namespace,
                key,
                value,
                partition,
            } => {
                let shown = value.to_string();
                self.store.set(steam_id, &namespace, &key, value, partition, false)?;
                Ok(format!("{}.{}/{} = {}", namespace, partition, key, shown))
            }
            ConsoleCommand::Save(Some(steam_id)) => {
                self.store.save_one(steam_id, None).await?;
                Ok(format!("Saved {}", steam_id))
            }
            ConsoleCommand::Save(None) => {
                let count = self.store.save_all_active().await?;
                Ok(format!("Saved {} players", count))
            }
            ConsoleCommand::Reload => {
                self.registry.reload_all()?;
                Ok(format!("Reloaded {} config modules", self.registry.modules().len()))
            }
            ConsoleCommand::Configs { show_protected } => {
                let lines: Vec<String> = self
                    .registry
                    .list_entries(show_protected)
                    .into_iter()
                    .map(|entry| {
                        format!(
                            "{}/{}/{} ({}) = {} [{}]",
                            entry.module, entry.group, entry.name, entry.type_tag, entry.current_value, entry.flags
                        )
                    })
                    .collect();
                Ok(lines.join("\n"))
            }
            ConsoleCommand::Purge(days) => {
                let days = days.unwrap_or(self.db.settings().purge_days);
                let removed = self.db.purge_inactive(days).await?;
                Ok(format!("Purged {} players inactive for {} days", removed, days))
            }
            ConsoleCommand::Help => Ok(HELP.to_string()),
            ConsoleCommand::Quit => Ok("Shutting down".to_string()),
        }
    }

    /// Reads stdin until `quit` or end of input.
    pub async fn run(self) -> ConsoleExit {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        info!("⌨️ Admin console ready, type 'help' for commands");

        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => return ConsoleExit::Closed,
                Err(e) => {
                    error!("❌ Console read failed: {}", e);
                    return ConsoleExit::Closed;
                }
            };

            let command = match ConsoleCommand::parse(&line) {
                Ok(Some(command)) => command,
                Ok(None) => continue,
                Err(e) => {
                    println!("{}", e);
                    continue;
                }
            };
            let quit = command == ConsoleCommand::Quit;

            match self.execute(command).await {
                Ok(reply) if !reply.is_empty() => println!("{}", reply),
                Ok(_) => {}
                Err(e) => error!("❌ {:#}", e),
            }
            if quit {
                return ConsoleExit::Quit;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;
    use zenith_core::storage::{defaults, StoreOptions};
    use zenith_core::{DatabaseSettings, TickDispatcher};

    #[test]
    fn test_parse_commands() {
        assert_eq!(ConsoleCommand::parse("   ").unwrap(), None);
        assert_eq!(
            ConsoleCommand::parse("join 76561198012345678 Some Player").unwrap(),
            Some(ConsoleCommand::Join {
                steam_id: SteamId::new(76561198012345678),
                name: "Some Player".to_string(),
            })
        );
        assert_eq!(
            ConsoleCommand::parse("set 7 ranks Points 5000").unwrap(),
            Some(ConsoleCommand::Set {
                steam_id: SteamId::new(7),
                namespace: "ranks".to_string(),
                key: "Points".to_string(),
                value: json!(5000),
                partition: Partition::Storage,
            })
        );
        assert_eq!(
            ConsoleCommand::parse("set 7 prefs Color gold settings").unwrap(),
            Some(ConsoleCommand::Set {
                steam_id: SteamId::new(7),
                namespace: "prefs".to_string(),
                key: "Color".to_string(),
                value: json!("gold"),
                partition: Partition::Settings,
            })
        );
        assert_eq!(ConsoleCommand::parse("SAVE").unwrap(), Some(ConsoleCommand::Save(None)));
        assert_eq!(
            ConsoleCommand::parse("configs all").unwrap(),
            Some(ConsoleCommand::Configs { show_protected: true })
        );
        assert_eq!(ConsoleCommand::parse("purge 7").unwrap(), Some(ConsoleCommand::Purge(Some(7))));
        assert_eq!(ConsoleCommand::parse("quit").unwrap(), Some(ConsoleCommand::Quit));
    }

    #[test]
    fn test_parse_errors() {
        assert!(ConsoleCommand::parse("join abc Name").is_err());
        assert!(ConsoleCommand::parse("join 7").is_err());
        assert!(ConsoleCommand::parse("leave").is_err());
        assert!(ConsoleCommand::parse("get 7 ranks").is_err());
        assert!(ConsoleCommand::parse("get 7 ranks Points elsewhere").is_err());
        assert!(ConsoleCommand::parse("purge soon").is_err());
        assert!(ConsoleCommand::parse("teleport 7").is_err());
    }

    #[tokio::test]
    async fn test_console_session() {
        let dir = TempDir::new().unwrap();
        let db = Database::connect(DatabaseSettings::sqlite(dir.path().join("console.db"), "zn_"))
            .await
            .unwrap();
        db.ensure_tables().await.unwrap();

        let registry = ConfigRegistry::new(dir.path().join("configs"));
        zenith_core::config::core_config::register_core_config(&registry).unwrap();

        let store = PlayerStore::with_database(db.clone(), TickDispatcher::new(), StoreOptions::default());
        store
            .register_storage("ranks", defaults([("Points", json!(0))]))
            .await
            .unwrap();

        let console = Console::new(store.clone(), registry, db);
        let run = |line: &str| {
            let console = console.clone();
            let command = ConsoleCommand::parse(line).unwrap().unwrap();
            async move { console.execute(command).await }
        };

        run("join 42 Tester").await.unwrap();
        assert_eq!(run("get 42 ranks Points").await.unwrap(), "0");
        run("set 42 ranks Points 5000").await.unwrap();
        assert_eq!(run("get 42 ranks Points").await.unwrap(), "5000");
        assert_eq!(run("save").await.unwrap(), "Saved 1 players");
        run("leave 42").await.unwrap();
        assert!(run("get 42 ranks Points").await.is_err());

        run("join 42 Tester").await.unwrap();
        assert_eq!(run("get 42 ranks Points").await.unwrap(), "5000");

        let listing = run("configs").await.unwrap();
        assert!(listing.contains("Core/Config/AutoReload"));
        assert!(!listing.contains("Password"));
        assert!(run("configs all").await.unwrap().contains("Core/Database/Password"));
        assert!(run("reload").await.is_ok());
        assert_eq!(run("purge").await.unwrap(), "Purged 0 players inactive for 30 days");
    }
}
