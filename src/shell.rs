use std::io::{BufRead, Write};

use crate::{
    assemble::ResultBundle,
    error::Result,
    features::FIELD_LABELS,
    session::Session,
    stats::DEFAULT_SAMPLE_SIZE,
};

/// What the loop should do after a line was handled.
#[derive(Debug, PartialEq, Eq)]
pub enum Outcome {
    Continue,
    Quit,
}

/// Run the interactive feedback loop on stdin/stdout.
///
/// Each line maps to one session operation; errors are printed and the
/// loop keeps going, so a stale docno or a premature `rerank` never ends
/// the session.
pub fn run(session: &mut Session) -> Result<()> {
    let stdin = std::io::stdin();
    let mut stdout = std::io::stdout();

    println!("tabrank shell - type 'help' for commands");
    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            break;
        }

        match execute_line(session, line.trim()) {
            Ok(Outcome::Quit) => break,
            Ok(Outcome::Continue) => {}
            Err(e) => eprintln!("error: {e}"),
        }
    }

    Ok(())
}

/// Dispatch one command line against the session.
pub fn execute_line(session: &mut Session, line: &str) -> Result<Outcome> {
    let (command, rest) = match line.split_once(' ') {
        Some((cmd, rest)) => (cmd, rest.trim()),
        None => (line, ""),
    };

    match command {
        "" => {}
        "query" => {
            session.set_query(rest)?;
            print_bundles(&session.bundles()?);
        }
        "limit" => {
            let n: usize = rest.parse().map_err(|_| {
                crate::error::Error::Config(format!(
                    "not a result count: '{rest}'"
                ))
            })?;
            session.set_num_results(n)?;
            print_bundles(&session.bundles()?);
        }
        "show" => print_bundles(&session.bundles()?),
        "mark" => {
            let (docno, judgment) =
                rest.rsplit_once(' ').ok_or_else(|| {
                    crate::error::Error::Config(
                        "usage: mark <docno> +|-".to_string(),
                    )
                })?;
            let relevant = match judgment {
                "+" => true,
                "-" => false,
                other => {
                    return Err(crate::error::Error::Config(format!(
                        "judgment must be + or -, got '{other}'"
                    )));
                }
            };
            session.mark(docno.trim(), relevant)?;
            println!(
                "marked {} as {}",
                docno.trim(),
                if relevant { "relevant" } else { "not relevant" }
            );
        }
        "train" => {
            session.apply_feedback()?;
            println!(
                "model trained on {} judgment(s)",
                session.feedback().len()
            );
        }
        "rerank" => {
            session.rerank()?;
            print_bundles(&session.bundles()?);
        }
        "domains" => {
            let sample = if rest.is_empty() {
                DEFAULT_SAMPLE_SIZE
            } else {
                rest.parse().map_err(|_| {
                    crate::error::Error::Config(format!(
                        "not a sample size: '{rest}'"
                    ))
                })?
            };
            let stats = session.domain_stats(sample)?;
            if stats.is_empty() {
                println!("no resolvable domains in the sample");
            }
            for stat in &stats {
                let flag = if session.filter().is_blacklisted(&stat.domain)
                {
                    " [blocked]"
                } else {
                    ""
                };
                println!(
                    "{:>6.2}%  {}{flag}",
                    stat.percentage, stat.domain
                );
            }
            // sticky choices for domains absent from this sample
            for (domain, blacklisted) in session.filter().iter() {
                if blacklisted
                    && !stats.iter().any(|s| s.domain == domain)
                {
                    println!("{:>6}   {domain} [blocked]", "-");
                }
            }
        }
        "block" => {
            session.set_domain_filter(rest, true)?;
            println!("blocked {rest}");
        }
        "allow" => {
            session.set_domain_filter(rest, false)?;
            println!("allowed {rest}");
        }
        "importances" => {
            let importances = session.importances()?;
            print!("{:<16}", "");
            for label in FIELD_LABELS {
                print!("{label:>16}");
            }
            println!();
            for (i, term) in session.terms().iter().enumerate() {
                print!("{:<16}", truncate(term, 15));
                for field in 0..FIELD_LABELS.len() {
                    print!("{:>16.4}", importances.get(i, field));
                }
                println!();
            }
        }
        "help" => print_help(),
        "quit" | "exit" => return Ok(Outcome::Quit),
        other => {
            return Err(crate::error::Error::Config(format!(
                "unknown command '{other}', try 'help'"
            )));
        }
    }

    Ok(Outcome::Continue)
}

fn print_help() {
    println!("commands:");
    println!("  query <text>      set the query and retrieve");
    println!("  limit <n>         change the result count");
    println!("  show              print the current results");
    println!("  mark <docno> +|-  record relevance feedback");
    println!("  train             fit the model on recorded feedback");
    println!("  rerank            re-score results with the model");
    println!("  domains [n]       domain distribution over a sample");
    println!("  block <domain>    blacklist a source domain");
    println!("  allow <domain>    clear a blacklist entry");
    println!("  importances       per-term/per-field model importances");
    println!("  quit              leave the shell");
}

fn print_bundles(bundles: &[ResultBundle]) {
    if bundles.is_empty() {
        println!("No results.");
        return;
    }

    for (i, b) in bundles.iter().enumerate() {
        println!(
            "{:>3}. [{:.3}] #{}  {}",
            i + 1,
            b.score,
            b.docno,
            title_line(b)
        );
        if !b.url.is_empty() {
            println!("     {}", b.url);
        }

        let mut notes = Vec::new();
        if let Some(score) = b.ltr_score {
            notes.push(format!("learned: {score:.3}"));
        }
        match b.feedback {
            Some(true) => notes.push("marked relevant".to_string()),
            Some(false) => notes.push("marked not relevant".to_string()),
            None => {}
        }
        if !notes.is_empty() {
            println!("     {}", notes.join("   "));
        }

        print_table(&b.header, &b.rows);
    }
    println!("\n{} result(s)", bundles.len());
}

fn title_line(b: &ResultBundle) -> String {
    match (b.page_title.is_empty(), b.table_title.is_empty()) {
        (false, false) => format!("{} / {}", b.page_title, b.table_title),
        (false, true) => b.page_title.clone(),
        (true, false) => b.table_title.clone(),
        (true, true) => "(untitled)".to_string(),
    }
}

fn print_table(header: &[String], rows: &[Vec<String>]) {
    if header.is_empty() {
        return;
    }

    let mut widths: Vec<usize> =
        header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.chars().count());
            }
        }
    }

    let line = |cells: &[String]| {
        let joined: Vec<String> = cells
            .iter()
            .zip(&widths)
            .map(|(cell, &width)| format!("{cell:<width$}"))
            .collect();
        println!("     {}", joined.join(" | "));
    };

    line(header);
    for row in rows {
        line(row);
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        forest::ForestParams,
        table_store::{TableRecord, TableStore},
        tantivy_index::SearchIndex,
    };

    fn session() -> (tempfile::TempDir, Session) {
        let tmp = tempfile::tempdir().unwrap();
        let store = TableStore::open(&tmp.path().join("tables.redb")).unwrap();
        let records: Vec<TableRecord> = (0..4)
            .map(|i| TableRecord {
                docno: format!("d{i}"),
                page_title: "Chairs".to_string(),
                title: String::new(),
                url: format!("https://s{i}.example/t"),
                text_before: String::new(),
                text_after: String::new(),
                relation: vec![vec![
                    "item".to_string(),
                    format!("chair {i}"),
                ]],
            })
            .collect();
        store.batch_insert(&records).unwrap();

        let index = SearchIndex::open_in_ram().unwrap();
        let mut writer = index.writer(15_000_000).unwrap();
        for r in &records {
            index.add_record(&writer, r).unwrap();
        }
        writer.commit().unwrap();

        let session = Session::new(Arc::new(index), Arc::new(store))
            .with_forest_params(ForestParams {
                n_trees: 10,
                ..ForestParams::default()
            });
        (tmp, session)
    }

    #[test]
    fn full_command_sequence() {
        let (_tmp, mut s) = session();

        assert_eq!(
            execute_line(&mut s, "query chair").unwrap(),
            Outcome::Continue
        );
        assert!(!s.candidates().is_empty());

        let first = s.candidates()[0].docno.clone();
        let last = s.candidates().last().unwrap().docno.clone();
        execute_line(&mut s, &format!("mark {first} +")).unwrap();
        execute_line(&mut s, &format!("mark {last} -")).unwrap();
        execute_line(&mut s, "train").unwrap();
        assert!(s.has_model());

        execute_line(&mut s, "rerank").unwrap();
        execute_line(&mut s, "importances").unwrap();
        assert_eq!(
            execute_line(&mut s, "quit").unwrap(),
            Outcome::Quit
        );
    }

    #[test]
    fn premature_actions_error_without_quitting() {
        let (_tmp, mut s) = session();
        execute_line(&mut s, "query chair").unwrap();

        assert!(execute_line(&mut s, "train").is_err());
        assert!(execute_line(&mut s, "rerank").is_err());
        assert!(execute_line(&mut s, "mark ghost +").is_err());
        // the session is still usable
        assert_eq!(
            execute_line(&mut s, "show").unwrap(),
            Outcome::Continue
        );
    }

    #[test]
    fn block_and_allow_update_the_filter() {
        let (_tmp, mut s) = session();
        execute_line(&mut s, "query chair").unwrap();

        execute_line(&mut s, "block s0.example").unwrap();
        assert!(s.filter().is_blacklisted("s0.example"));

        execute_line(&mut s, "allow s0.example").unwrap();
        assert!(!s.filter().is_blacklisted("s0.example"));
    }

    #[test]
    fn unknown_command_is_an_error() {
        let (_tmp, mut s) = session();
        assert!(execute_line(&mut s, "frobnicate").is_err());
    }

    #[test]
    fn mark_requires_a_judgment() {
        let (_tmp, mut s) = session();
        execute_line(&mut s, "query chair").unwrap();
        assert!(execute_line(&mut s, "mark d0 yes").is_err());
        assert!(execute_line(&mut s, "mark d0").is_err());
    }
}
