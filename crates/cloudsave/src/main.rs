use std::io::{self, Write as _};
use std::path::{Path, PathBuf};

use clap::{Parser, Subcommand};

use cloudsave::config::{DEFAULT_SETTINGS_FILE, GameProfile, Settings};
use cloudsave::error::{Error, ErrorKind, Result};
use cloudsave::prompt::{Prompt, is_yes};
use cloudsave::remote::{GitHubStore, RemoteStore};
use cloudsave::sync::{SyncEngine, SyncOutcome, provision};
use cloudsave::{backup, manifest};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Args {
    /// Path to the settings file
    #[arg(long, default_value = DEFAULT_SETTINGS_FILE)]
    settings: PathBuf,
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Reconcile a game's local saves with the remote store
    Sync {
        /// Game to sync; prompted interactively when omitted
        game: Option<String>,
    },
    /// List the games present in the remote repository
    Games,
    /// First-run wizard: collect settings and provision remote storage
    Init,
    /// Register another game and provision its remote storage
    AddGame,
    /// Take a timestamped backup of a game's save directory
    Backup {
        game: String,
    },
}

struct StdinPrompt;

impl Prompt for StdinPrompt {
    fn ask(&mut self, question: &str) -> Result<String> {
        println!("{question}");
        io::stdout()
            .flush()
            .map_err(|e| Error::new(ErrorKind::Config, format!("stdout error: {e}")))?;
        let mut line = String::new();
        io::stdin()
            .read_line(&mut line)
            .map_err(|e| Error::new(ErrorKind::Config, format!("stdin error: {e}")))?;
        Ok(line.trim().to_string())
    }

    fn notify(&mut self, message: &str) {
        println!("{message}");
    }
}

fn main() {
    dotenv::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let args = Args::parse();
    if let Err(e) = run(args) {
        eprintln!("error: {e}");
        std::process::exit(1);
    }
}

fn run(args: Args) -> Result<()> {
    match args.cmd {
        Command::Sync { game } => cmd_sync(&args.settings, game),
        Command::Games => cmd_games(&args.settings),
        Command::Init => cmd_init(&args.settings),
        Command::AddGame => cmd_add_game(&args.settings),
        Command::Backup { game } => cmd_backup(&args.settings, &game),
    }
}

fn open_store(settings: &Settings) -> Result<GitHubStore> {
    GitHubStore::new(&settings.owner, &settings.repo, settings.token()?)
}

fn cmd_sync(settings_path: &Path, game: Option<String>) -> Result<()> {
    if !settings_path.is_file() {
        println!("No settings detected. Starting first time setup...");
        return cmd_init(settings_path);
    }
    let settings = Settings::load(settings_path)?;
    let store = open_store(&settings)?;
    let mut prompt = StdinPrompt;

    println!(
        "Attempting to read data from target repo {}.",
        settings.repo
    );
    let mut remote_games: Vec<String> = store
        .list("")?
        .into_iter()
        .map(|e| e.name)
        .collect();
    if remote_games.is_empty() {
        println!("Empty repo found. Creating structure for games listed in settings.");
        provision(&store, &settings.game_names())?;
        remote_games = settings.game_names();
    }

    let game = match game {
        Some(g) => g,
        None => {
            println!("Found: {}", remote_games.join(", "));
            prompt.ask("Enter the name of the game you wish to manage:")?
        }
    };
    if !remote_games.contains(&game) {
        return Err(Error::new(
            ErrorKind::Config,
            format!("unknown game '{game}' (remote has: {})", remote_games.join(", ")),
        ));
    }
    let Some(profile) = settings.profile(&game) else {
        return Err(Error::new(
            ErrorKind::Config,
            format!("game '{game}' exists in the repo but not in settings; run 'cloudsave add-game'"),
        ));
    };

    let engine = SyncEngine::new(&store);
    match engine.run(&profile, &mut prompt)? {
        SyncOutcome::Uploaded {
            file_name,
            last_saved,
        } => println!(
            "Save '{file_name}' uploaded successfully (lastSaved {}).",
            manifest::format_timestamp(last_saved)
        ),
        SyncOutcome::Downloaded { file_name } => {
            println!("Save '{file_name}' downloaded successfully.");
        }
        SyncOutcome::Skipped => println!("Nothing changed."),
    }
    Ok(())
}

fn cmd_games(settings_path: &Path) -> Result<()> {
    let settings = Settings::load(settings_path)?;
    let store = open_store(&settings)?;
    let entries = store.list("")?;
    if entries.is_empty() {
        println!("Remote repository is empty.");
        return Ok(());
    }
    for entry in entries {
        let registered = settings.games.contains_key(&entry.name);
        let marker = if registered { "" } else { "  (not in settings)" };
        println!("{}{marker}", entry.name);
    }
    Ok(())
}

fn ask_profile(prompt: &mut dyn Prompt) -> Result<GameProfile> {
    let name = prompt.ask("Enter game name:")?;
    let path = prompt.ask("Enter game save folder path:")?;
    let backup_path = prompt.ask("Enter backup folder path:")?;
    Ok(GameProfile {
        name,
        path: PathBuf::from(path),
        backup_path: PathBuf::from(backup_path),
    })
}

fn cmd_init(settings_path: &Path) -> Result<()> {
    let mut prompt = StdinPrompt;
    let repo = prompt.ask("Enter target repo name (where saves will be kept):")?;
    let owner = prompt.ask("Enter GitHub username (must be owner of the target repo):")?;
    let auth = prompt.ask("Enter repo auth key (private repos):")?;
    let mut settings = Settings {
        owner,
        repo,
        auth,
        games: Default::default(),
    };
    settings.add_game(ask_profile(&mut prompt)?)?;

    let preview = serde_json::to_string_pretty(&settings)
        .map_err(|e| Error::new(ErrorKind::Config, format!("failed to encode settings: {e}")))?;
    println!("{preview}");
    if !is_yes(&prompt.ask("Confirm settings? (Y/N)")?) {
        println!("Setup aborted.");
        return Ok(());
    }
    settings.save(settings_path)?;

    let store = open_store(&settings)?;
    provision(&store, &settings.game_names())?;
    println!("Setup complete.");
    Ok(())
}

fn cmd_add_game(settings_path: &Path) -> Result<()> {
    let mut settings = Settings::load(settings_path)?;
    let mut prompt = StdinPrompt;
    let profile = ask_profile(&mut prompt)?;
    let name = profile.name.clone();
    settings.add_game(profile)?;
    settings.save(settings_path)?;

    // Provision storage unless the game already has a manifest.
    let store = open_store(&settings)?;
    if store.get(&manifest::manifest_path(&name))?.is_none() {
        manifest::create(&store, &name)?;
    }
    println!("Game '{name}' registered.");
    Ok(())
}

fn cmd_backup(settings_path: &Path, game: &str) -> Result<()> {
    let settings = Settings::load(settings_path)?;
    let Some(profile) = settings.profile(game) else {
        return Err(Error::new(
            ErrorKind::Config,
            format!("game '{game}' is not in settings"),
        ));
    };
    let result = backup::backup(&profile)?;
    println!(
        "Backed up {} file(s) to {}.",
        result.files,
        result.dir.display()
    );
    Ok(())
}
