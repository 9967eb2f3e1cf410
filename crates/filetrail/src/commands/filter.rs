//! Content filter command handler.

use super::history::print_filter_outcome;
use clap::Args;
use filetrail_snapshot::{
    Combinator, ContentFilter, FilterCriteria, HistoryEngine, SearchTerm, TermMode,
};
use std::path::PathBuf;

/// Arguments of `filetrail filter`.
#[derive(Args)]
pub struct FilterArgs {
    file: PathBuf,

    /// Text snapshots must contain (omit to show the current filter)
    term: Option<String>,

    /// Hide snapshots that contain the term instead
    #[arg(short = 'x', long)]
    exclude: bool,

    /// Match the term case-sensitively
    #[arg(short = 'c', long)]
    case_sensitive: bool,

    /// Second term, required in addition to the first
    #[arg(long, value_name = "TEXT", conflicts_with = "or", requires = "term")]
    and: Option<String>,

    /// Second term, shows snapshots that fail the first term but contain it
    #[arg(long, value_name = "TEXT", requires = "term")]
    or: Option<String>,

    /// The second term excludes instead of includes
    #[arg(long)]
    exclude_second: bool,

    /// Match the second term case-sensitively
    #[arg(long)]
    case_sensitive_second: bool,

    /// Rescan every snapshot instead of only the new ones
    #[arg(long)]
    full: bool,

    /// Remove the filter
    #[arg(long, conflicts_with = "term")]
    clear: bool,
}

impl FilterArgs {
    fn criteria(&self) -> Option<FilterCriteria> {
        let term1 = term(
            self.term.as_deref()?,
            self.exclude,
            self.case_sensitive,
        );
        let criteria = FilterCriteria::new(term1);
        let second = |text: &str| term(text, self.exclude_second, self.case_sensitive_second);
        Some(match (&self.and, &self.or) {
            (Some(text), _) => criteria.and(second(text)),
            (None, Some(text)) => criteria.or(second(text)),
            (None, None) => criteria,
        })
    }
}

fn term(text: &str, exclude: bool, case_sensitive: bool) -> SearchTerm {
    let term = if exclude {
        SearchTerm::exclude(text)
    } else {
        SearchTerm::include(text)
    };
    term.case_sensitive(case_sensitive)
}

/// Handle the filter command.
pub async fn handle_filter(engine: &HistoryEngine, args: FilterArgs) -> anyhow::Result<()> {
    if args.clear {
        engine.clear_filter(&args.file).await?;
        println!("Filter removed.");
        return Ok(());
    }

    let Some(criteria) = args.criteria() else {
        return show_filter(engine, &args.file).await;
    };

    let outcome = engine.apply_filter(&args.file, &criteria, args.full).await?;
    if outcome.active {
        print_filter_outcome(&outcome);
    } else {
        println!("Filter removed.");
    }
    Ok(())
}

async fn show_filter(engine: &HistoryEngine, file: &std::path::Path) -> anyhow::Result<()> {
    let tracked = engine.open(file).await?;
    let state = ContentFilter::new(tracked.history_dir()).load_state().await?;
    let Some(state) = state else {
        println!("No filter set.");
        return Ok(());
    };

    let criteria = &state.criteria;
    println!("First term: {}", describe(&criteria.term1));
    if let Some(term2) = criteria.second() {
        let combinator = match criteria.combinator {
            Combinator::Or => "or",
            Combinator::And => "and",
        };
        println!("Second term ({}): {}", combinator, describe(term2));
    }
    println!("Hidden snapshots: {}", state.filtered.len());
    if let Some(high_water) = &state.high_water {
        println!("Scanned up to: {}", high_water);
    }
    Ok(())
}

fn describe(term: &SearchTerm) -> String {
    let mode = match term.mode {
        TermMode::Include => "contains",
        TermMode::Exclude => "lacks",
    };
    let case = if term.case_sensitive {
        ", case-sensitive"
    } else {
        ""
    };
    format!("{} {:?}{}", mode, term.text, case)
}
