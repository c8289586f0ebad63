use std::error::Error;
use std::io::Write;
use std::path::PathBuf;

use clap::{Parser, Subcommand, error::ErrorKind};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::filter::LevelFilter;

use crate::activity::{ActivityAggregator, classify_tier};
use crate::attribution::run_attribution;
use crate::config::Settings;
use crate::constants::config::{DEFAULT_CONFIG_PATH, DEFAULT_STATUS_GROUP};
use crate::data::Tier;
use crate::extract::IdentityExtractor;
use crate::index::load_all_user_badges;
use crate::metrics::TierDistribution;
use crate::report::{
    classify_with_badge, participation_stats, phase_activity, status_group, user_agent_counts,
};
use crate::source::{RequestFilter, RequestSource};
use crate::transport::Database;
use crate::types::BadgeTitle;
use crate::utils::{format_epoch, parse_csv_fields, tsv_field, write_csv_row};

#[derive(Debug, Parser)]
#[command(
    name = "activity-attribution",
    disable_help_subcommand = true,
    about = "Attribute logged requests to platform users and report participation",
    long_about = "Rebuild the request-to-user attribution table from the access log \
                  and report per-user activity tiers over the configured date range.",
    after_help = "Warnings go to stderr. Set RUST_LOG (for example RUST_LOG=info) \
                  to see progress and attribution summaries."
)]
struct AnalyticsCli {
    #[arg(
        long,
        global = true,
        value_name = "FILE",
        default_value = DEFAULT_CONFIG_PATH,
        help = "JSON settings file"
    )]
    config: PathBuf,
    #[command(subcommand)]
    action: Action,
}

#[derive(Debug, Subcommand)]
enum Action {
    /// Rebuild the request-to-user attribution table.
    RunAttribution,
    /// Per-user activity counts and tier as CSV.
    RunAggregateReport,
    /// Per-user tier with a badge membership flag as CSV.
    ClassifyUsers {
        #[arg(long, value_name = "TITLE", help = "Badge whose holders are flagged")]
        badge: BadgeTitle,
        #[arg(
            long = "status-group",
            value_name = "A,B,...",
            value_parser = parse_badge_group,
            help = "Preferred badges for an extra status column, first held wins"
        )]
        status_group: Option<BadgeGroup>,
    },
    /// Tier distribution for all users and per badge.
    ParticipationStats {
        #[arg(long = "badge", value_name = "TITLE", help = "Repeat to add a badge row")]
        badges: Vec<BadgeTitle>,
    },
    /// Per-phase activity tiers with badge group columns as CSV.
    ActivityPhases {
        #[arg(
            long = "badge-group",
            value_name = "A,B,...",
            value_parser = parse_badge_group,
            help = "Ordered badge titles; repeat for more columns"
        )]
        badge_groups: Vec<BadgeGroup>,
    },
    /// Tab-separated request listing with the extracted user name.
    ListRequests {
        #[arg(long = "path-prefix", value_name = "PREFIX")]
        path_prefix: Option<String>,
    },
    /// User agents by frequency.
    ListUas {
        #[arg(long, help = "Group user agents by browser family")]
        summarize: bool,
    },
}

/// Ordered badge titles given as one comma-separated argument.
#[derive(Clone, Debug, PartialEq, Eq)]
struct BadgeGroup(Vec<BadgeTitle>);

/// Parse `args_iter` (without the program name) and run the chosen action.
///
/// Output goes to `out`; help and version requests print and return `Ok`.
pub fn run_cli<I, W>(args_iter: I, out: &mut W) -> Result<(), Box<dyn Error>>
where
    I: Iterator<Item = String>,
    W: Write,
{
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::WARN.into())
        .from_env_lossy();
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init();

    let Some(cli) = parse_cli::<AnalyticsCli, _>(
        std::iter::once("activity-attribution".to_string()).chain(args_iter),
    )?
    else {
        return Ok(());
    };

    let settings = Settings::load(&cli.config)?;
    let database = Database::from_descriptor(&settings.dsn)?;

    match cli.action {
        Action::RunAttribution => {
            let summary = run_attribution(&database, &settings)?;
            writeln!(out, "{}", serde_json::to_string_pretty(&summary)?)?;
        }
        Action::RunAggregateReport => {
            let aggregator = ActivityAggregator::new(database, &settings)?;
            let activities = aggregator.aggregate(&settings.date_range())?.collect_all()?;
            write_csv_row(
                out,
                ["name", "email", "comments", "proposals", "votes", "requests", "tier"],
            )?;
            for activity in activities {
                let tier = classify_tier(&activity);
                write_csv_row(
                    out,
                    [
                        activity.user.display_name,
                        activity.user.email,
                        activity.comment_count.to_string(),
                        activity.proposal_count.to_string(),
                        activity.vote_count.to_string(),
                        activity.request_count.to_string(),
                        tier.to_string(),
                    ],
                )?;
            }
        }
        Action::ClassifyUsers {
            badge,
            status_group: preferred,
        } => {
            let conn = database.connect()?;
            let aggregator = ActivityAggregator::new(database, &settings)?;
            let rows = classify_with_badge(&aggregator, &conn, &settings.date_range(), &badge)?;
            let memberships = match preferred {
                Some(_) => Some(load_all_user_badges(&conn)?),
                None => None,
            };
            let mut header = vec!["name", "email", "badge", "tier"];
            if preferred.is_some() {
                header.push("status");
            }
            write_csv_row(out, header)?;
            for row in rows {
                let mut fields = vec![
                    row.name,
                    row.email,
                    if row.has_badge { "yes" } else { "no" }.to_string(),
                    row.tier.to_string(),
                ];
                if let (Some(BadgeGroup(preferred)), Some(memberships)) =
                    (&preferred, &memberships)
                {
                    let status = memberships
                        .get(&row.user_id)
                        .map(|held| status_group(held, preferred, DEFAULT_STATUS_GROUP))
                        .unwrap_or_else(|| DEFAULT_STATUS_GROUP.to_string());
                    fields.push(status);
                }
                write_csv_row(out, fields)?;
            }
        }
        Action::ParticipationStats { badges } => {
            let conn = database.connect()?;
            let aggregator = ActivityAggregator::new(database, &settings)?;
            let stats = participation_stats(&aggregator, &conn, &settings.date_range(), &badges)?;
            write_csv_row(out, ["group", "tier", "users", "percent"])?;
            write_distribution(out, "all", &stats.all)?;
            for (badge, distribution) in &stats.by_badge {
                write_distribution(out, badge, distribution)?;
            }
        }
        Action::ActivityPhases { badge_groups } => {
            let badge_groups: Vec<Vec<BadgeTitle>> =
                badge_groups.into_iter().map(|group| group.0).collect();
            if settings.phases.is_empty() {
                return Err("no phases configured".into());
            }
            let conn = database.connect()?;
            let aggregator = ActivityAggregator::new(database, &settings)?;
            let rows = phase_activity(&aggregator, &conn, &settings, &badge_groups)?;
            let mut header = vec![
                "phase".to_string(),
                "name".to_string(),
                "email".to_string(),
                "tier".to_string(),
            ];
            header.extend(badge_groups.iter().map(|group| group.join("|")));
            write_csv_row(out, header)?;
            for row in rows {
                let mut fields = vec![row.phase, row.name, row.email, row.tier.to_string()];
                fields.extend(row.groups);
                write_csv_row(out, fields)?;
            }
        }
        Action::ListRequests { path_prefix } => {
            let extractor = IdentityExtractor::new()?;
            let mut filter = RequestFilter::from_settings(&settings);
            if let Some(prefix) = path_prefix {
                filter = filter.with_path_prefix(prefix);
            }
            let records = RequestSource::new(database)
                .stream(&filter, settings.request_buffer_size)?
                .collect_all()?;
            for record in records {
                let candidate = extractor
                    .extract(&record)
                    .map(|candidate| candidate.name)
                    .unwrap_or_else(|| "-".to_string());
                writeln!(
                    out,
                    "{}\t{}\t{}\t{}",
                    record.id,
                    format_epoch(record.access_time),
                    tsv_field(&record.request_path),
                    tsv_field(&candidate)
                )?;
            }
        }
        Action::ListUas { summarize } => {
            let source = RequestSource::new(database);
            let filter = RequestFilter::from_settings(&settings);
            let counts =
                user_agent_counts(&source, &filter, settings.request_buffer_size, summarize)?;
            for (agent, count) in counts.most_common() {
                writeln!(out, "{count}\t{}", tsv_field(agent))?;
            }
        }
    }
    out.flush()?;
    Ok(())
}

fn write_distribution<W: Write>(
    out: &mut W,
    group: &str,
    distribution: &TierDistribution,
) -> std::io::Result<()> {
    for tier in Tier::ALL {
        write_csv_row(
            out,
            [
                group.to_string(),
                tier.to_string(),
                distribution.get(tier).to_string(),
                distribution.percent(tier).to_string(),
            ],
        )?;
    }
    Ok(())
}

fn parse_badge_group(raw: &str) -> Result<BadgeGroup, String> {
    let group = parse_csv_fields(raw);
    if group.is_empty() {
        return Err(format!("badge group '{raw}' lists no badge titles"));
    }
    Ok(BadgeGroup(group))
}

fn parse_cli<T, I>(args: I) -> Result<Option<T>, Box<dyn Error>>
where
    T: Parser,
    I: IntoIterator,
    I::Item: Into<std::ffi::OsString> + Clone,
{
    match T::try_parse_from(args) {
        Ok(cli) => Ok(Some(cli)),
        Err(err) => match err.kind() {
            ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => {
                err.print()?;
                Ok(None)
            }
            _ => Err(err.into()),
        },
    }
}
