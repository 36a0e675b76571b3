use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use serde::Serialize;
use serde_json::json;

use shijing::config::BackendConfig;
use shijing::context::AppContext;
use shijing::gateway::DataSource;
use shijing::model::{Poem, Poet};
use shijing::resolve_state_path;
use shijing::routes::Route;
use shijing::service::interpret::{AnalysisRequest, AnalysisType, Interpretation};
use shijing::state::{
    DEFAULT_BY_POET_LIMIT, DEFAULT_POEM_LIMIT, DEFAULT_POET_LIMIT, DEFAULT_POPULAR_LIMIT,
    DEFAULT_SEARCH_LIMIT, ListState, PoemStore,
};
use shijing::storage::FileStorage;

#[derive(Parser)]
#[command(
    name = "shijing-cli",
    about = "诗境寻踪: browse classical Chinese poems and poets"
)]
struct Cli {
    /// Output machine-readable JSON (default: human-readable)
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List poems, newest first
    Poems {
        #[arg(long, default_value_t = DEFAULT_POEM_LIMIT)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    /// Read one poem (recorded in the reading history)
    Poem { id: i64 },
    /// Search poems (or poets with --poets)
    Search {
        /// Search text (positional, collects remaining args)
        query: Vec<String>,
        #[arg(long)]
        poets: bool,
        #[arg(long, default_value_t = DEFAULT_SEARCH_LIMIT)]
        limit: usize,
    },
    /// Most-read poems
    Popular {
        #[arg(long, default_value_t = DEFAULT_POPULAR_LIMIT)]
        limit: usize,
    },
    /// Poems similar to a poem
    Related {
        id: i64,
        #[arg(long, default_value_t = 5)]
        limit: usize,
        #[arg(long, help = "Show interpreter similarity scores instead of full poems")]
        scored: bool,
    },
    /// Works of one poet
    ByPoet {
        poet_id: i64,
        #[arg(long, default_value_t = DEFAULT_BY_POET_LIMIT)]
        limit: usize,
    },
    /// Poems of one dynasty
    Dynasty {
        name: String,
        #[arg(long, default_value_t = DEFAULT_POEM_LIMIT)]
        limit: usize,
    },
    /// List poets, optionally of one dynasty
    Poets {
        #[arg(long)]
        dynasty: Option<String>,
        #[arg(long, default_value_t = DEFAULT_POET_LIMIT)]
        limit: usize,
    },
    /// Show one poet with their works
    Poet { id: i64 },
    /// Toggle a poem in the favorites
    Favorite { id: i64 },
    /// Show (or clear) the favorites
    Favorites {
        #[arg(long)]
        clear: bool,
    },
    /// Show the reading history, newest first
    History {
        #[arg(long)]
        clear: bool,
        #[arg(long, help = "Remove the entry recorded at this RFC 3339 timestamp")]
        remove: Option<DateTime<Utc>>,
    },
    /// Show (or clear) recent searches
    Searches {
        #[arg(long)]
        clear: bool,
    },
    /// Forget favorites, reading history and searches
    Reset,
    /// Reading statistics, per dynasty or for one poet
    Stats {
        #[arg(long)]
        poet: Option<i64>,
    },
    /// Interpret a poem
    Analyze {
        id: i64,
        #[arg(long = "type", value_enum, default_value_t = AnalysisType::Comprehensive)]
        analysis_type: AnalysisType,
        #[arg(long)]
        question: Option<String>,
        #[arg(long, help = "Recompute and overwrite the cached interpretation")]
        refresh: bool,
        #[arg(long, help = "Drop the cached interpretation instead of showing one")]
        forget: bool,
    },
    /// Ask a free-form question about poetry
    Ask {
        question: Vec<String>,
        #[arg(long, help = "Poem title or text the question is about")]
        context: Option<String>,
    },
    /// Open a page path such as /poems/2 or /search?q=春
    Open { path: String },
    /// Check the backend connection
    Status,
}

// ============================================================================
// Output Formatting
// ============================================================================

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), Box<dyn std::error::Error>> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print a tagged result, noting on stderr when sample data is shown.
fn print_sourced<T: Serialize>(
    json: bool,
    source: Option<DataSource>,
    data: &T,
    human: impl FnOnce(&T),
) -> Result<(), Box<dyn std::error::Error>> {
    if json {
        return print_json(&json!({ "source": source, "data": data }));
    }
    if source == Some(DataSource::Fallback) {
        eprintln!("(backend unavailable, showing built-in sample data)");
    }
    human(data);
    Ok(())
}

fn format_poem(poem: &Poem) {
    println!("《{}》 {} [{}]", poem.title, poem.author(), poem.dynasty);
    println!();
    for line in poem.content.lines() {
        println!("  {line}");
    }
    if !poem.tags.is_empty() {
        println!();
        println!("Tags: {}", poem.tags.join(", "));
    }
}

fn format_poem_list(poems: &[Poem]) {
    if poems.is_empty() {
        eprintln!("No poems found.");
    }
    for poem in poems {
        println!("{:>5}  《{}》 {}", poem.id, poem.title, poem.author());
    }
}

fn format_poet(poet: &Poet) {
    let years = match (poet.birth_year, poet.death_year) {
        (Some(b), Some(d)) => format!(" ({b}–{d})"),
        _ => String::new(),
    };
    println!("{} [{}]{years}", poet.name, poet.dynasty);
    if !poet.biography.is_empty() {
        println!("  {}", poet.biography);
    }
    if !poet.poems.is_empty() {
        println!();
        println!("Works:");
        format_poem_list(&poet.poems);
    }
}

fn format_poet_list(poets: &[Poet]) {
    if poets.is_empty() {
        eprintln!("No poets found.");
    }
    for poet in poets {
        println!("{:>5}  {} [{}]", poet.id, poet.name, poet.dynasty);
    }
}

fn format_interpretation(interpretation: &Interpretation) {
    println!("{}", interpretation.analysis);
    if !interpretation.insights.is_empty() {
        println!();
        println!("Insights:");
        for insight in &interpretation.insights {
            println!("  - {insight}");
        }
    }
    if !interpretation.recommendations.is_empty() {
        println!();
        println!("Suggestions:");
        for tip in &interpretation.recommendations {
            println!("  - {tip}");
        }
    }
    if !interpretation.related_poems.is_empty() {
        println!();
        println!("Related:");
        for related in &interpretation.related_poems {
            println!(
                "  《{}》 {} ({:.0}%)",
                related.title,
                related.author,
                related.similarity * 100.0
            );
        }
    }
}

/// Print a store listing, or its error and exit.
fn print_list<T: Serialize>(
    json: bool,
    list: &ListState<T>,
    human: impl FnOnce(&Vec<T>),
) -> Result<(), Box<dyn std::error::Error>> {
    if let Some(ref error) = list.error {
        eprintln!("Error: {error}");
        std::process::exit(1);
    }
    print_sourced(json, list.source, &list.items, human)
}

// ============================================================================
// Pages
// ============================================================================

async fn show_poem(
    store: &mut PoemStore,
    id: i64,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(poem) = store.fetch_poem_by_id(id).await.cloned() else {
        eprintln!("Poem {id} could not be loaded.");
        std::process::exit(1);
    };
    store.add_to_history(&poem).await;

    if json {
        return print_json(&json!({
            "data": poem,
            "favorite": store.is_favorite(poem.id),
        }));
    }
    format_poem(&poem);
    if store.is_favorite(poem.id) {
        println!();
        println!("★ In favorites");
    }
    Ok(())
}

async fn show_poet(ctx: &AppContext, id: i64, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let poet = ctx.poets.get(id).await?;
    print_sourced(json, Some(poet.source()), poet.data(), format_poet)
}

async fn show_favorites(
    store: &PoemStore,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let poems = store.favorite_poems().await;

    if json {
        return print_json(&json!({ "ids": store.favorites(), "data": poems }));
    }
    if store.favorites().is_empty() {
        eprintln!("No favorites yet.");
    }
    format_poem_list(&poems);
    Ok(())
}

/// Poem counts per dynasty, from the current poem listing.
fn show_categories(store: &PoemStore, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let mut by_dynasty: BTreeMap<&str, Vec<&str>> = BTreeMap::new();
    for poem in &store.poems.items {
        let dynasty = if poem.dynasty.is_empty() { "其他" } else { poem.dynasty.as_str() };
        by_dynasty.entry(dynasty).or_default().push(poem.title.as_str());
    }

    if json {
        return print_json(&by_dynasty);
    }
    for (dynasty, titles) in &by_dynasty {
        println!("{dynasty} ({})", titles.len());
        for title in titles {
            println!("  《{title}》");
        }
    }
    Ok(())
}

async fn open(
    store: &mut PoemStore,
    path: &str,
    json: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let Some(route) = Route::resolve(path) else {
        eprintln!("Unknown page '{path}'.");
        std::process::exit(1);
    };
    if !json {
        println!("== {} ==", route.title());
        println!();
    }

    match route {
        Route::Home => {
            store.initialize().await;
            if json {
                return print_json(&json!({ "poems": store.poems, "poets": store.poets }));
            }
            print_list(json, &store.poems, |poems| format_poem_list(poems))?;
            println!();
            print_list(json, &store.poets, |poets| format_poet_list(poets))
        }
        Route::Poems => {
            store.fetch_poems(DEFAULT_POEM_LIMIT, 0).await;
            print_list(json, &store.poems, |poems| format_poem_list(poems))
        }
        Route::PoemDetail(id) => show_poem(store, id, json).await,
        Route::Poets => {
            store.fetch_poets(DEFAULT_POET_LIMIT).await;
            print_list(json, &store.poets, |poets| format_poet_list(poets))
        }
        Route::PoetDetail(id) => show_poet(store.context(), id, json).await,
        Route::Categories => {
            store.fetch_poems(DEFAULT_POEM_LIMIT, 0).await;
            show_categories(store, json)
        }
        Route::Favorites => show_favorites(store, json).await,
        Route::Search(Some(query)) => {
            store.search_poems(&query, DEFAULT_SEARCH_LIMIT).await;
            print_list(json, &store.poems, |poems| format_poem_list(poems))
        }
        Route::Search(None) => {
            let records = store.search_records();
            if json {
                return print_json(&records);
            }
            for record in records {
                println!("  {record}");
            }
            Ok(())
        }
    }
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let ctx = AppContext::from_config(&BackendConfig::from_env());
    let storage = Arc::new(FileStorage::open(resolve_state_path()));
    let mut store = PoemStore::new(ctx.clone(), storage);

    match cli.command {
        Command::Poems { limit, offset } => {
            store.fetch_poems(limit, offset).await;
            print_list(cli.json, &store.poems, |poems| format_poem_list(poems))?;
        }
        Command::Poem { id } => show_poem(&mut store, id, cli.json).await?,
        Command::Search {
            query,
            poets,
            limit,
        } => {
            let query = query.join(" ");
            if query.trim().is_empty() {
                eprintln!("Error: No search text provided.");
                std::process::exit(1);
            }
            if poets {
                let found = ctx.search.search_poets(&query, limit).await?;
                store.add_search_record(&query);
                print_sourced(cli.json, Some(found.source()), found.data(), |poets| {
                    format_poet_list(poets)
                })?;
            } else {
                store.search_poems(&query, limit).await;
                print_list(cli.json, &store.poems, |poems| format_poem_list(poems))?;
            }
        }
        Command::Popular { limit } => {
            store.fetch_popular_poems(limit).await;
            print_list(cli.json, &store.poems, |poems| format_poem_list(poems))?;
        }
        Command::Related {
            id,
            limit,
            scored: true,
        } => {
            let related = ctx.interpretation.related(id, limit).await?;
            if cli.json {
                print_json(&json!({ "data": related }))?;
            } else {
                for poem in &related {
                    println!(
                        "{:>5}  《{}》 {} ({:.0}%)",
                        poem.id,
                        poem.title,
                        poem.author,
                        poem.similarity * 100.0
                    );
                }
            }
        }
        Command::Related { id, limit, .. } => {
            let related = ctx.poems.related(id, limit).await?;
            print_sourced(cli.json, Some(related.source()), related.data(), |poems| {
                format_poem_list(poems)
            })?;
        }
        Command::ByPoet { poet_id, limit } => {
            store.fetch_poems_by_poet(poet_id, limit).await;
            print_list(cli.json, &store.poems, |poems| format_poem_list(poems))?;
        }
        Command::Dynasty { name, limit } => {
            let poems = ctx.poems.by_dynasty(&name, limit).await?;
            print_sourced(cli.json, Some(poems.source()), poems.data(), |poems| {
                format_poem_list(poems)
            })?;
        }
        Command::Poets { dynasty, limit } => match dynasty {
            Some(dynasty) => {
                let poets = ctx.poets.by_dynasty(&dynasty).await?;
                print_sourced(cli.json, Some(poets.source()), poets.data(), |poets| {
                    format_poet_list(poets)
                })?;
            }
            None => {
                store.fetch_poets(limit).await;
                print_list(cli.json, &store.poets, |poets| format_poet_list(poets))?;
            }
        },
        Command::Poet { id } => show_poet(&ctx, id, cli.json).await?,
        Command::Favorite { id } => {
            let favorite = store.toggle_favorite(id);
            if cli.json {
                print_json(&json!({ "id": id, "favorite": favorite }))?;
            } else if favorite {
                println!("Added poem {id} to favorites.");
            } else {
                println!("Removed poem {id} from favorites.");
            }
        }
        Command::Favorites { clear } => {
            if clear {
                store.clear_favorites();
                eprintln!("Favorites cleared.");
            } else {
                show_favorites(&store, cli.json).await?;
            }
        }
        Command::History { clear, remove } => {
            if clear {
                store.clear_history();
                eprintln!("Reading history cleared.");
            } else if let Some(timestamp) = remove {
                if !store.remove_from_history(timestamp) {
                    eprintln!("No history entry at {timestamp}.");
                    std::process::exit(1);
                }
                eprintln!("Removed history entry at {timestamp}.");
            } else if cli.json {
                print_json(&store.history())?;
            } else if store.history().is_empty() {
                eprintln!("No reading history.");
            } else {
                for entry in store.history() {
                    println!(
                        "{}  《{}》 {} (poem {})",
                        entry.timestamp.to_rfc3339(),
                        entry.title,
                        entry.author,
                        entry.id
                    );
                }
            }
        }
        Command::Searches { clear } => {
            if clear {
                store.clear_search_history();
                eprintln!("Search history cleared.");
            } else if cli.json {
                print_json(&store.search_records())?;
            } else {
                for record in store.search_records() {
                    println!("{record}");
                }
            }
        }
        Command::Reset => {
            store.clear_all();
            eprintln!("Favorites, reading history and searches cleared.");
        }
        Command::Stats { poet } => match poet {
            Some(poet_id) => {
                let stats = ctx.behavior.poet_statistics(poet_id).await;
                if cli.json {
                    print_json(&stats)?;
                } else if let Some(stats) = stats {
                    println!("{}", serde_json::to_string_pretty(&stats)?);
                } else {
                    eprintln!("No statistics available for poet {poet_id}.");
                }
            }
            None => {
                let stats = ctx.behavior.dynasty_statistics().await;
                if cli.json {
                    print_json(&stats)?;
                } else if stats.is_empty() {
                    eprintln!("No statistics available.");
                } else {
                    for row in &stats {
                        println!("{row}");
                    }
                }
            }
        },
        Command::Analyze {
            id,
            analysis_type,
            question,
            refresh,
            forget,
        } => {
            if forget {
                let removed = ctx.interpretation.evict(id, analysis_type).await;
                if cli.json {
                    print_json(&json!({ "removed": removed }))?;
                } else if removed {
                    println!("Dropped cached {} interpretation of poem {id}.", analysis_type.as_str());
                } else {
                    eprintln!("No cached interpretation to drop.");
                }
                return Ok(());
            }

            let poem = ctx.poems.get(id).await?.into_data();
            let request = AnalysisRequest {
                poem_id: Some(poem.id),
                poem_title: Some(poem.title.clone()),
                poem_content: Some(poem.content.clone()),
                analysis_type,
                user_question: question,
            };
            let interpretation = if refresh {
                ctx.interpretation.refresh(&request).await?
            } else {
                ctx.interpretation.analyze(&request).await?
            };
            if cli.json {
                print_json(&interpretation)?;
            } else {
                println!("《{}》 · {}", poem.title, analysis_type.label());
                println!();
                format_interpretation(&interpretation);
            }
        }
        Command::Ask { question, context } => {
            let question = question.join(" ");
            if question.trim().is_empty() {
                eprintln!("Error: No question provided.");
                std::process::exit(1);
            }
            let answer = ctx.interpretation.ask(&question, context.as_deref()).await?;
            if cli.json {
                print_json(&answer)?;
            } else {
                format_interpretation(&answer);
            }
        }
        Command::Open { path } => open(&mut store, &path, cli.json).await?,
        Command::Status => {
            let status = ctx.backend_status().await;
            if cli.json {
                print_json(&status)?;
            } else {
                println!("configured:   {}", status.configured);
                println!("connected:    {}", status.connected);
                println!("tables exist: {}", status.tables_exist);
                if let Some(error) = status.error {
                    println!("error:        {error}");
                }
            }
        }
    }

    Ok(())
}
