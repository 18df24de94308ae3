use std::env;
use std::io::{self, BufRead, Write};
use std::process;

use mahdb::{errinput, RelnConfig, Relation, Result, Tuple};

fn main() {
    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        usage(&args[0]);
    }
    let result = match args[1].as_str() {
        "create" => cmd_create(&args[2..]),
        "insert" => cmd_insert(&args[2..]),
        "select" => cmd_select(&args[2..]),
        "stats" => cmd_stats(&args[2..]),
        _ => usage(&args[0]),
    };
    if let Err(err) = result {
        eprintln!("{err}");
        process::exit(1);
    }
}

fn usage(prog: &str) -> ! {
    eprintln!("Usage: {prog} create <name> <nattrs> <npages> <depth> <cv>");
    eprintln!("       {prog} insert <name> [<tuple>]");
    eprintln!("       {prog} select <name> <pattern>");
    eprintln!("       {prog} stats <name>");
    process::exit(1);
}

fn parse_count(what: &str, s: &str) -> Result<u32> {
    match s.parse() {
        Ok(n) => Ok(n),
        Err(_) => errinput!("{what} {s} is not a number"),
    }
}

fn cmd_create(args: &[String]) -> Result<()> {
    let [name, nattrs, npages, depth, chvec] = args else {
        return errinput!("create takes <name> <nattrs> <npages> <depth> <cv>");
    };
    let config = RelnConfig::new(parse_count("nattrs", nattrs)?)
        .npages(parse_count("npages", npages)?)
        .depth(parse_count("depth", depth)?)
        .chvec(chvec.as_str());
    Relation::create(name, &config)?.close()
}

fn cmd_insert(args: &[String]) -> Result<()> {
    let (name, tuple) = match args {
        [name] => (name, None),
        [name, tuple] => (name, Some(tuple)),
        _ => return errinput!("insert takes <name> and an optional <tuple>"),
    };
    let mut reln = Relation::open(name)?;
    match tuple {
        Some(s) => {
            let tuple = Tuple::parse(s, reln.nattrs())?;
            reln.insert(&tuple)?;
        }
        // With no tuple argument, read one tuple per line from stdin.
        None => {
            for line in io::stdin().lock().lines() {
                let line = line?;
                if line.is_empty() {
                    continue;
                }
                let tuple = Tuple::parse(&line, reln.nattrs())?;
                reln.insert(&tuple)?;
            }
        }
    }
    reln.close()
}

fn cmd_select(args: &[String]) -> Result<()> {
    let [name, pattern] = args else {
        return errinput!("select takes <name> <pattern>");
    };
    let reln = Relation::open(name)?;
    let stdout = io::stdout();
    let mut out = stdout.lock();
    for tuple in reln.query(pattern)? {
        writeln!(out, "{}", tuple?)?;
    }
    Ok(())
}

fn cmd_stats(args: &[String]) -> Result<()> {
    let [name] = args else {
        return errinput!("stats takes <name>");
    };
    let reln = Relation::open(name)?;
    reln.stats(&mut io::stdout().lock())
}
