use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::time::Instant;

use clap::Parser as ClapParser;

use caraway_lang::{
    compile, evaluate_root, parse_document, value_to_json, Environment, Error, ModelPool,
};

#[derive(ClapParser)]
#[command(name = "caraway")]
#[command(about = "Caraway - a JSONPath-style query language over columnar document pools")]
#[command(version)]
struct Cli {
    /// JSON documents to load; each file becomes one root
    files: Vec<PathBuf>,

    /// Run a single query and exit
    #[arg(short = 'e', long)]
    eval: Option<String>,

    /// Wrap top-level expressions in any(...)
    #[arg(long)]
    any: bool,

    /// Print the compiled expression tree before evaluating
    #[arg(long)]
    verbose: bool,

    /// Evaluate documents in parallel, one thread per document
    #[arg(long)]
    mt: bool,
}

struct Switches {
    any: bool,
    verbose: bool,
    mt: bool,
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();
    let mut switches = Switches {
        any: cli.any,
        verbose: cli.verbose,
        mt: cli.mt,
    };

    let env = Environment::new();
    let mut pool = ModelPool::with_strings(env.strings().clone());

    for file in &cli.files {
        let text = match std::fs::read_to_string(file) {
            Ok(text) => text,
            Err(e) => {
                eprintln!("cannot read {}: {}", file.display(), e);
                std::process::exit(1);
            }
        };
        if let Err(e) = parse_document(&mut pool, &text) {
            eprintln!("cannot load {}: {}", file.display(), e);
            std::process::exit(1);
        }
    }

    if let Some(query) = &cli.eval {
        if let Err(e) = run_query(&env, &pool, query, &switches) {
            eprintln!("{}", e);
            std::process::exit(1);
        }
        return;
    }

    // Interactive loop: '/' lines toggle switches, anything else is a
    // query evaluated against every loaded document.
    let interactive = atty::is(atty::Stream::Stdin);
    let stdin = io::stdin();
    loop {
        if interactive {
            print!("> ");
            let _ = io::stdout().flush();
        }
        let mut line = String::new();
        match stdin.lock().read_line(&mut line) {
            Ok(0) => break,
            Ok(_) => {}
            Err(e) => {
                eprintln!("{}", e);
                break;
            }
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some(switch) = line.strip_prefix('/') {
            match switch {
                "any" => {
                    switches.any = !switches.any;
                    println!("any: {}", switches.any);
                }
                "verbose" => {
                    switches.verbose = !switches.verbose;
                    println!("verbose: {}", switches.verbose);
                }
                "mt" => {
                    switches.mt = !switches.mt;
                    println!("mt: {}", switches.mt);
                }
                "quit" | "q" => break,
                other => eprintln!("unknown switch: /{}", other),
            }
            continue;
        }
        if let Err(e) = run_query(&env, &pool, line, &switches) {
            eprintln!("{}", e);
        }
    }
}

fn run_query(
    env: &Environment,
    pool: &ModelPool,
    query: &str,
    switches: &Switches,
) -> Result<(), Error> {
    let source = if switches.any {
        format!("any({})", query)
    } else {
        query.to_string()
    };
    let expr = compile(env, &source)?;

    for warning in env.take_warnings() {
        eprintln!("warning: {}", warning.message);
    }
    if switches.verbose {
        print!("{}", expr.dump());
    }

    let roots = pool.roots().len();
    if roots == 0 {
        return Err(Error::NullModel);
    }

    let started = Instant::now();
    let expr = &expr;
    let outputs: Vec<Vec<String>> = if switches.mt && roots > 1 {
        std::thread::scope(|scope| {
            let handles: Vec<_> = (0..roots)
                .map(|i| scope.spawn(move || render_root(env, expr, pool, i)))
                .collect();
            handles
                .into_iter()
                .map(|h| match h.join() {
                    Ok(result) => result,
                    Err(_) => Err(Error::InvalidExpression(
                        "evaluation thread panicked".to_string(),
                    )),
                })
                .collect::<Result<Vec<_>, Error>>()
        })?
    } else {
        (0..roots)
            .map(|i| render_root(env, expr, pool, i))
            .collect::<Result<Vec<_>, Error>>()?
    };

    let elapsed = started.elapsed();
    for lines in outputs {
        for line in lines {
            println!("{}", line);
        }
    }
    println!("elapsed: {} ms", elapsed.as_millis());
    Ok(())
}

fn render_root(
    env: &Environment,
    expr: &caraway_lang::Expr,
    pool: &ModelPool,
    root: usize,
) -> Result<Vec<String>, Error> {
    let values = evaluate_root(env, expr, pool, root)?;
    Ok(values
        .iter()
        .map(|v| value_to_json(v).to_string())
        .collect())
}
