use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use menu_cache::cache::{CacheOptions, FilterOutcome, MenuCache, SqliteMenuStore};
use menu_cache::profile::{Profile, ProfileStore, ProfileUpdate};
use menu_cache::{Config, FilterState, RemoteMenuSource, Section};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "menucache")]
#[command(about = "Browse a restaurant menu from a local-first cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/menucache/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Only show items whose name contains this text
  #[arg(short, long, default_value = "")]
  query: String,

  /// Only show this category (repeatable; none means all)
  #[arg(short = 'C', long = "category")]
  categories: Vec<String>,

  /// Re-download the menu before querying
  #[arg(long)]
  resync: bool,

  /// Log to stderr instead of the log file
  #[arg(long)]
  log_stderr: bool,

  #[command(subcommand)]
  command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// Show or edit the local user profile
  Profile {
    #[command(subcommand)]
    action: Option<ProfileAction>,
  },
}

#[derive(Subcommand, Debug)]
enum ProfileAction {
  /// Print the stored profile
  Show,
  /// Update profile fields, completing onboarding if needed
  Set(ProfileArgs),
  /// Log out: forget the stored profile
  Clear,
}

#[derive(clap::Args, Debug)]
struct ProfileArgs {
  #[arg(long)]
  first_name: Option<String>,
  #[arg(long)]
  last_name: Option<String>,
  #[arg(long)]
  email: Option<String>,
  #[arg(long)]
  phone: Option<String>,
  /// Avatar image URI
  #[arg(long)]
  image: Option<String>,
  #[arg(long)]
  order_statuses: Option<bool>,
  #[arg(long)]
  password_changes: Option<bool>,
  #[arg(long)]
  special_offers: Option<bool>,
  #[arg(long)]
  newsletter: Option<bool>,
}

impl From<ProfileArgs> for ProfileUpdate {
  fn from(args: ProfileArgs) -> Self {
    ProfileUpdate {
      first_name: args.first_name,
      last_name: args.last_name,
      email: args.email,
      phone_number: args.phone,
      order_statuses: args.order_statuses,
      password_changes: args.password_changes,
      special_offers: args.special_offers,
      newsletter: args.newsletter,
      image: args.image,
    }
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();
  let config = Config::load(args.config.as_deref())?;
  let database_path = config.database_path()?;
  let _log_guard = init_logging(&database_path, args.log_stderr)?;

  if let Some(Command::Profile { action }) = args.command {
    return run_profile(&config, action.unwrap_or(ProfileAction::Show));
  }

  print_profile_banner(&config);

  let store = SqliteMenuStore::open(&database_path)?;
  let source = RemoteMenuSource::new(config.remote_url()?, config.remote_timeout())?;
  // A single command-line query has nothing to coalesce with
  let options = CacheOptions {
    debounce: std::time::Duration::ZERO,
    ..config.cache_options()
  };
  let cache = MenuCache::new(store, source, options);

  let mut sections = cache.bootstrap().await?;

  if args.resync {
    let outcome = cache.resync().await?;
    info!(changed = outcome.changed, count = outcome.record_count, "resync finished");
    sections = cache.projection();
  }

  let filter = build_filter(&config, &args.query, &args.categories);
  if filter != FilterState::default() {
    match cache.apply_filter(filter).await? {
      FilterOutcome::Applied(filtered) => sections = filtered,
      FilterOutcome::Superseded => return Err(eyre!("filter request was superseded")),
    }
  }

  print_sections(&sections, &config.remote.image_url_template);
  Ok(())
}

/// Map command-line categories onto the configured toggles.
fn build_filter(config: &Config, query: &str, categories: &[String]) -> FilterState {
  let requested: Vec<String> = categories.iter().map(|c| c.trim().to_lowercase()).collect();
  for category in &requested {
    if !config.categories.contains(category) {
      warn!(category = %category, "ignoring unknown category");
      eprintln!("Unknown category '{}', ignoring", category);
    }
  }

  let selections: Vec<bool> = config
    .categories
    .iter()
    .map(|c| requested.contains(c))
    .collect();
  FilterState::from_toggles(query, &config.categories, &selections)
}

fn init_logging(database_path: &Path, to_stderr: bool) -> Result<Option<WorkerGuard>> {
  let filter = EnvFilter::try_from_env("MENUCACHE_LOG").unwrap_or_else(|_| EnvFilter::new("info"));

  if to_stderr {
    tracing_subscriber::fmt()
      .with_env_filter(filter)
      .with_writer(std::io::stderr)
      .init();
    return Ok(None);
  }

  let log_dir = database_path
    .parent()
    .ok_or_else(|| eyre!("database path has no parent directory"))?;
  std::fs::create_dir_all(log_dir)?;
  let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(
    log_dir,
    "menucache.log",
  ));

  tracing_subscriber::fmt()
    .with_env_filter(filter)
    .with_writer(writer)
    .with_ansi(false)
    .init();
  Ok(Some(guard))
}

fn run_profile(config: &Config, action: ProfileAction) -> Result<()> {
  let store = ProfileStore::open(&config.profile_path()?)?;

  match action {
    ProfileAction::Show => match store.load()? {
      Some(profile) => print_profile(&profile),
      None => println!("Onboarding not completed. Use `menucache profile set` to create a profile."),
    },
    ProfileAction::Set(args) => {
      let update = ProfileUpdate::from(args);
      if update.is_empty() {
        return Err(eyre!("nothing to update; pass at least one field"));
      }
      let first_time = !store.onboarding_completed()?;
      let profile = store.update(&update)?;
      info!(first_time, "profile updated");
      if first_time {
        println!("Onboarding completed.");
      }
      print_profile(&profile);
    }
    ProfileAction::Clear => {
      store.clear()?;
      info!("profile cleared");
      println!("Logged out.");
    }
  }
  Ok(())
}

fn print_profile(profile: &Profile) {
  let yes_no = |flag: bool| if flag { "yes" } else { "no" };

  println!("[{}] {} {}", profile.initials(), profile.first_name, profile.last_name);
  println!("  email:            {}", profile.email);
  println!("  phone:            {}", profile.phone_number);
  if !profile.image.is_empty() {
    println!("  image:            {}", profile.image);
  }
  println!("  order statuses:   {}", yes_no(profile.order_statuses));
  println!("  password changes: {}", yes_no(profile.password_changes));
  println!("  special offers:   {}", yes_no(profile.special_offers));
  println!("  newsletter:       {}", yes_no(profile.newsletter));
}

fn print_profile_banner(config: &Config) {
  let profile = config
    .profile_path()
    .and_then(|path| ProfileStore::open(&path))
    .and_then(|store| store.load());

  match profile {
    Ok(Some(profile)) => println!(
      "[{}] {} {}\n",
      profile.initials(),
      profile.first_name,
      profile.last_name
    ),
    Ok(None) => println!("(onboarding not completed, see `menucache profile set`)\n"),
    Err(e) => warn!(error = %e, "could not load profile"),
  }
}

fn print_sections(sections: &[Section], image_url_template: &str) {
  if sections.is_empty() {
    println!("No menu items match.");
    return;
  }

  for section in sections {
    println!("{}", section.name);
    for item in &section.items {
      println!("  {:<32} {:>8}", item.name, item.display_price());
      if !item.description.is_empty() {
        println!("    {}", item.description);
      }
      if !item.image.is_empty() {
        println!("    {}", item.image_url(image_url_template));
      }
    }
    println!();
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_profile_set_parses_into_update() {
    let args = Args::try_parse_from([
      "menucache",
      "profile",
      "set",
      "--first-name",
      "Ana",
      "--phone",
      "555-0100",
      "--newsletter",
      "false",
    ])
    .unwrap();

    let Some(Command::Profile {
      action: Some(ProfileAction::Set(fields)),
    }) = args.command
    else {
      panic!("expected profile set");
    };
    let update = ProfileUpdate::from(fields);
    assert_eq!(update.first_name.as_deref(), Some("Ana"));
    assert_eq!(update.phone_number.as_deref(), Some("555-0100"));
    assert_eq!(update.newsletter, Some(false));
    assert_eq!(update.email, None);

    let store = ProfileStore::open_in_memory().unwrap();
    store.update(&update).unwrap();
    assert!(store.onboarding_completed().unwrap());
  }

  #[test]
  fn test_bare_profile_and_clear_parse() {
    let args = Args::try_parse_from(["menucache", "profile"]).unwrap();
    assert!(matches!(args.command, Some(Command::Profile { action: None })));

    let args = Args::try_parse_from(["menucache", "profile", "clear"]).unwrap();
    assert!(matches!(
      args.command,
      Some(Command::Profile {
        action: Some(ProfileAction::Clear)
      })
    ));
  }

  #[test]
  fn test_query_flags_still_parse_without_subcommand() {
    let args = Args::try_parse_from(["menucache", "-q", "cake", "-C", "desserts"]).unwrap();
    assert!(args.command.is_none());
    assert_eq!(args.query, "cake");
    assert_eq!(args.categories, vec!["desserts".to_string()]);
  }
}
