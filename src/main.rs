use log::{error, info, warn};
use product_recommender::catalog_loader::CatalogLoader;
use product_recommender::config::RecommenderConfig;
use product_recommender::database::Database;
use product_recommender::model::{ModelHandle, SqliteCatalog};
use std::io::{self, BufRead, Write};

fn main() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .try_init();

    let config = RecommenderConfig::from_env();
    let args: Vec<String> = std::env::args().collect();

    if args.iter().any(|a| a == "--help" || a == "-h") {
        print_help();
        return;
    }

    if let Some(pos) = args.iter().position(|a| a == "--import") {
        let Some(csv_path) = args.get(pos + 1) else {
            eprintln!("--import requires a CSV path");
            std::process::exit(2);
        };
        if let Err(e) = run_import(&config, csv_path) {
            error!("{}", e);
            std::process::exit(1);
        }
        return;
    }

    let handle = ModelHandle::new(Box::new(SqliteCatalog::new(&config.db_path)), &config);
    if let Err(e) = handle.build() {
        error!("Initial model build failed: {}", e);
        std::process::exit(1);
    }
    run_shell(&handle, config.top_n);
}

fn run_import(config: &RecommenderConfig, csv_path: &str) -> Result<(), String> {
    let mut db = Database::new(&config.db_path)
        .map_err(|e| format!("Failed to open catalog database {}: {}", config.db_path, e))?;
    let report = CatalogLoader::new().load_from_csv(csv_path, &mut db)?;
    for line in &report.errors {
        eprintln!("{}", line);
    }
    let total = db
        .get_product_count()
        .map_err(|e| format!("Failed to count products: {}", e))?;
    println!(
        "Imported {} products ({} processed, {} skipped); catalog now holds {}",
        report.imported, report.processed, report.skipped, total
    );
    Ok(())
}

fn run_shell(handle: &ModelHandle, default_top_n: usize) {
    if handle.snapshot().catalog().is_empty() {
        warn!("Catalog is empty; every query will return an empty list");
    }
    info!("Ready: {} products loaded", handle.catalog_size());
    let stdin = io::stdin();
    let stdout = io::stdout();
    let mut out = stdout.lock();

    for line in stdin.lock().lines() {
        let line = match line {
            Ok(l) if !l.trim().is_empty() => l,
            Ok(_) => continue,
            Err(_) => break,
        };
        let reply = match handle_command(handle, line.trim(), default_top_n) {
            Some(reply) => reply,
            None => break,
        };
        let _ = writeln!(out, "{}", reply);
        let _ = out.flush();
    }
}

/// Returns `None` when the shell should exit.
fn handle_command(handle: &ModelHandle, line: &str, default_top_n: usize) -> Option<String> {
    let mut parts = line.split_whitespace();
    let command = parts.next().unwrap_or("");
    let args: Vec<&str> = parts.collect();

    let reply = match command {
        "similar" => match parse_similar(&args, default_top_n) {
            Ok((id, top_n)) => format_ids(&handle.similar_to_item(id, top_n)),
            Err(e) => format!("error: {}", e),
        },
        "recommend" => match parse_recommend(&args, default_top_n) {
            Ok((ids, top_n)) => format_ids(&handle.recommend_for_user(&ids, top_n)),
            Err(e) => format!("error: {}", e),
        },
        "refresh" => match handle.refresh() {
            Ok(()) => format!("ok products={}", handle.catalog_size()),
            Err(e) => format!("error: {}", e),
        },
        "health" => {
            let stats = handle.stats();
            format!(
                "ok products={} vocabulary={} built_at={}",
                stats.products,
                stats.vocabulary,
                stats.built_at.to_rfc3339()
            )
        }
        "quit" | "exit" => return None,
        other => format!("error: unknown command '{}'", other),
    };
    Some(reply)
}

fn parse_top_n(arg: Option<&&str>, default_top_n: usize) -> Result<usize, String> {
    match arg {
        Some(raw) => raw
            .parse::<usize>()
            .map_err(|_| format!("invalid top_n '{}'", raw)),
        None => Ok(default_top_n),
    }
}

fn parse_similar(args: &[&str], default_top_n: usize) -> Result<(i64, usize), String> {
    let raw = args.first().ok_or_else(|| "usage: similar <id> [top_n]".to_string())?;
    let id = raw
        .parse::<i64>()
        .map_err(|_| format!("invalid product id '{}'", raw))?;
    Ok((id, parse_top_n(args.get(1), default_top_n)?))
}

fn parse_recommend(args: &[&str], default_top_n: usize) -> Result<(Vec<i64>, usize), String> {
    let raw = args
        .first()
        .ok_or_else(|| "usage: recommend <id,id,...> [top_n]".to_string())?;
    let ids = raw
        .split(',')
        .filter(|s| !s.trim().is_empty())
        .map(|s| {
            s.trim()
                .parse::<i64>()
                .map_err(|_| format!("invalid product id '{}'", s))
        })
        .collect::<Result<Vec<i64>, String>>()?;
    Ok((ids, parse_top_n(args.get(1), default_top_n)?))
}

fn format_ids(ids: &[i64]) -> String {
    let joined: Vec<String> = ids.iter().map(|id| id.to_string()).collect();
    format!("[{}]", joined.join(", "))
}

fn print_help() {
    println!("product-recommender: content-based product recommendations");
    println!();
    println!("USAGE:");
    println!("  product-recommender                 Build the model and read commands from stdin");
    println!("  product-recommender --import <csv>  Import products into the catalog database");
    println!();
    println!("COMMANDS:");
    println!("  similar <id> [top_n]                Products similar to one product");
    println!("  recommend <id,id,...> [top_n]       Recommendations for a view history");
    println!("  refresh                             Rebuild the model from the catalog");
    println!("  health                              Product and vocabulary counts");
    println!("  quit                                Exit");
    println!();
    println!("ENVIRONMENT:");
    println!("  RECOMMENDER_DB, RECOMMENDER_MAX_FEATURES, RECOMMENDER_TOP_N, RECOMMENDER_ROW_CHUNK");
}
