use std::fmt::Write as _;
use std::io::{self, Read};
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use indexmap::IndexSet;
use strum::IntoEnumIterator;
use time::macros::format_description;
use time::Date;

use super::Commands;
use crate::attachments::DirectoryHost;
use crate::config::AppConfig;
use crate::engine::{MutationEngine, MutationOutcome};
use crate::filter::{all_tags, filter_items, group_by_status, parse_filter, DateBucket, FilterSpec};
use crate::gateway::document::ItemRecord;
use crate::gateway::Gateway;
use crate::model::{local_today, Item, ItemId, ItemKind, ItemPatch, ItemStatus, Patch, Priority};
use crate::store::StoreHandle;

const SHORT_ID_LEN: usize = 8;

#[derive(Args, Debug, Clone)]
pub struct AddArgs {
    /// Text to capture, e.g. `todo report #work !high @friday`
    #[arg(allow_hyphen_values = true)]
    pub text: Vec<String>,
}

#[derive(Args, Debug, Clone)]
pub struct ListArgs {
    /// Filter tokens: tag:<name> prio:<level> date:today|overdue kind:task|note
    #[arg()]
    pub query: Vec<String>,
    /// Limit the number of items printed (defaults to list.limit from config)
    #[arg(long)]
    pub limit: Option<usize>,
    /// Print JSON records instead of text
    #[arg(long)]
    pub json: bool,
}

#[derive(Args, Debug, Clone)]
pub struct IdArgs {
    /// Item id or a unique prefix of it
    pub id: String,
}

#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Item id or a unique prefix of it
    pub id: String,
    /// todo, in_progress or done
    pub status: ItemStatus,
}

#[derive(Args, Debug, Clone, Default)]
pub struct EditArgs {
    /// Item id or a unique prefix of it
    pub id: String,
    #[arg(long)]
    pub content: Option<String>,
    /// New description; an empty string clears it
    #[arg(long)]
    pub description: Option<String>,
    #[arg(long)]
    pub priority: Option<Priority>,
    /// Due date as YYYY-MM-DD, or `none`
    #[arg(long)]
    pub due: Option<String>,
    /// Replace the tags (repeatable)
    #[arg(long)]
    pub tag: Vec<String>,
    /// Remove every tag
    #[arg(long, conflicts_with = "tag")]
    pub clear_tags: bool,
    /// todo or note
    #[arg(long)]
    pub kind: Option<ItemKind>,
}

#[derive(Args, Debug, Clone)]
pub struct AttachArgs {
    /// Item id or a unique prefix of it
    pub id: String,
    /// Image file (png, jpg, jpeg, webp)
    pub file: PathBuf,
}

#[derive(Args, Debug, Clone)]
pub struct DetachArgs {
    /// Item id or a unique prefix of it
    pub id: String,
    /// URL of the attached image
    pub url: String,
}

/// What a command produced. Notices go to stderr.
#[derive(Debug, Default)]
pub struct CommandOutput {
    pub stdout: String,
    pub notices: Vec<String>,
    pub rolled_back: bool,
}

pub async fn execute<G: Gateway>(
    engine: &mut MutationEngine<G>,
    config: &AppConfig,
    command: Commands,
) -> Result<CommandOutput> {
    let rollbacks = engine.subscribe();
    let engine = &*engine;
    let mut out = CommandOutput::default();

    if engine.principal().is_none() {
        out.notices
            .push("no principal configured (set `principal` in config.toml); nothing to do".into());
        return Ok(out);
    }
    engine.refresh().await.context("loading items")?;
    let today = local_today();

    match command {
        Commands::Add(args) => {
            let text = if args.text.is_empty() {
                read_stdin()?.unwrap_or_default()
            } else {
                args.text.join(" ")
            };
            let outcome = engine.capture(text.trim()).await?;
            report(&mut out, outcome, "Created", today);
        }
        Commands::List(args) => {
            let spec = parse_filter(&args.query.join(" "));
            let limit = args.limit.unwrap_or(config.list.limit);
            let store = engine.store().read();
            let mut items = filter_items(store.iter(), &spec, today);
            items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            items.truncate(limit);
            out.stdout = if args.json {
                let records: Vec<ItemRecord> = items.iter().map(|item| ItemRecord::from(*item)).collect();
                let mut json = serde_json::to_string_pretty(&records).context("encoding items")?;
                json.push('\n');
                json
            } else {
                format_list(&items, &spec, today)
            };
        }
        Commands::Tags => {
            let tags = all_tags(engine.store().read().iter());
            out.stdout = format_tags(&tags);
        }
        Commands::Board => {
            let store = engine.store().read();
            out.stdout = format_board(store.iter().filter(|item| item.is_task()), today);
        }
        Commands::Done(args) => {
            let id = resolve_id(engine.store(), &args.id)?;
            let outcome = engine.set_status(&id, ItemStatus::Done).await?;
            report(&mut out, outcome, "Done", today);
        }
        Commands::Toggle(args) => {
            let id = resolve_id(engine.store(), &args.id)?;
            let outcome = engine.toggle(&id).await?;
            report(&mut out, outcome, "Toggled", today);
        }
        Commands::Status(args) => {
            let id = resolve_id(engine.store(), &args.id)?;
            let outcome = engine.set_status(&id, args.status).await?;
            report(&mut out, outcome, &format!("Moved to {}:", args.status), today);
        }
        Commands::Edit(args) => {
            let id = resolve_id(engine.store(), &args.id)?;
            let patch = edit_patch(&args)?;
            let outcome = engine.update(&id, patch).await?;
            report(&mut out, outcome, "Updated", today);
        }
        Commands::Delete(args) => {
            let id = resolve_id(engine.store(), &args.id)?;
            if let MutationOutcome::Confirmed(()) = engine.delete(&id).await? {
                let _ = writeln!(out.stdout, "Deleted {}", short_id(&id));
            }
        }
        Commands::Attach(args) => {
            let host = attachment_host(config)?;
            let id = resolve_id(engine.store(), &args.id)?;
            let outcome = engine
                .upload_image(&host, &id, &args.file)
                .await
                .with_context(|| format!("attaching {}", args.file.display()))?;
            report(&mut out, outcome, "Attached image to", today);
        }
        Commands::Detach(args) => {
            let host = attachment_host(config)?;
            let id = resolve_id(engine.store(), &args.id)?;
            let outcome = engine.detach_image(&host, &id, &args.url).await?;
            report(&mut out, outcome, "Detached image from", today);
        }
    }

    for rollback in rollbacks.try_iter() {
        out.notices.push(format!("warning: {}", rollback.message()));
        out.rolled_back = true;
    }
    Ok(out)
}

fn report(out: &mut CommandOutput, outcome: MutationOutcome<Item>, verb: &str, today: Date) {
    if let MutationOutcome::Confirmed(item) = outcome {
        let _ = writeln!(out.stdout, "{verb} {}", format_item(&item, today));
    }
}

fn attachment_host(config: &AppConfig) -> Result<DirectoryHost> {
    if !config.attachments.enabled {
        bail!("attachments are disabled in config");
    }
    Ok(DirectoryHost::new(
        config.attachments.directory.clone(),
        config.attachments.public_base.clone(),
    ))
}

/// Accepts a full id or a prefix matching exactly one stored item.
fn resolve_id(store: &StoreHandle, raw: &str) -> Result<ItemId> {
    let raw = raw.trim();
    if raw.is_empty() {
        bail!("item id cannot be empty");
    }
    let store = store.read();
    let exact = ItemId::new(raw);
    if store.contains(&exact) {
        return Ok(exact);
    }
    let matches: Vec<ItemId> = store
        .ids()
        .into_iter()
        .filter(|id| id.as_str().starts_with(raw))
        .collect();
    match matches.as_slice() {
        [id] => Ok(id.clone()),
        [] => bail!("no item matches id {raw}"),
        _ => bail!("id prefix {raw} is ambiguous ({} items)", matches.len()),
    }
}

fn edit_patch(args: &EditArgs) -> Result<ItemPatch> {
    let mut patch = ItemPatch::default();
    if let Some(content) = &args.content {
        patch.content = Patch::Set(content.clone());
    }
    if let Some(description) = &args.description {
        let description = description.trim();
        patch.description = Patch::Set((!description.is_empty()).then(|| description.to_string()));
    }
    if let Some(priority) = args.priority {
        patch.priority = Patch::Set(priority);
    }
    if let Some(due) = &args.due {
        patch.due_date = Patch::Set(parse_due(due)?);
    }
    if args.clear_tags {
        patch.tags = Patch::Set(IndexSet::new());
    } else if !args.tag.is_empty() {
        let tags = args
            .tag
            .iter()
            .map(|tag| tag.trim().trim_start_matches('#').to_string())
            .filter(|tag| !tag.is_empty())
            .collect();
        patch.tags = Patch::Set(tags);
    }
    if let Some(kind) = args.kind {
        patch.kind = Patch::Set(kind);
    }
    if patch.is_empty() {
        bail!("nothing to change; pass at least one field to edit");
    }
    Ok(patch)
}

fn parse_due(raw: &str) -> Result<Option<Date>> {
    let raw = raw.trim();
    if raw.eq_ignore_ascii_case("none") {
        return Ok(None);
    }
    let date = Date::parse(raw, format_description!("[year]-[month]-[day]"))
        .with_context(|| format!("invalid due date {raw:?}, expected YYYY-MM-DD or none"))?;
    Ok(Some(date))
}

fn read_stdin() -> Result<Option<String>> {
    if atty::is(atty::Stream::Stdin) {
        return Ok(None);
    }
    let mut buf = String::new();
    io::stdin().read_to_string(&mut buf)?;
    Ok(Some(buf))
}

fn short_id(id: &ItemId) -> String {
    id.as_str().chars().take(SHORT_ID_LEN).collect()
}

fn format_item(item: &Item, today: Date) -> String {
    let marker = match (item.kind, item.status) {
        (ItemKind::Note, _) => "-",
        (_, ItemStatus::Pending) => "[ ]",
        (_, ItemStatus::Active) => "[~]",
        (_, ItemStatus::Done) => "[x]",
    };
    let mut line = format!("{marker} {}  {}", short_id(&item.id), item.content);
    if item.priority != Priority::None {
        let _ = write!(line, "  !{}", item.priority);
    }
    if let Some(due) = item.due_date {
        let _ = write!(line, "  @{due}");
        if !item.completed() && DateBucket::Overdue.contains(Some(due), today) {
            line.push_str(" (overdue)");
        }
    }
    if !item.tags.is_empty() {
        let tags: Vec<String> = item.tags.iter().map(|tag| format!("#{tag}")).collect();
        let _ = write!(line, "  {}", tags.join(" "));
    }
    if !item.images.is_empty() {
        let _ = write!(line, "  [images: {}]", item.images.len());
    }
    line
}

fn format_list(items: &[&Item], spec: &FilterSpec, today: Date) -> String {
    let mut out = String::new();
    if items.is_empty() {
        out.push_str("No items.");
        if !spec.is_empty() {
            let _ = write!(out, " (filters: {})", spec.chips().join(" "));
        }
        out.push('\n');
        return out;
    }
    for item in items {
        let _ = writeln!(out, "{}", format_item(item, today));
        if let Some(description) = &item.description {
            let _ = writeln!(out, "      {description}");
        }
    }
    out
}

fn format_tags(tags: &[String]) -> String {
    if tags.is_empty() {
        return "No tags yet.\n".to_string();
    }
    tags.iter().fold(String::new(), |mut out, tag| {
        let _ = writeln!(out, "#{tag}");
        out
    })
}

fn format_board<'a>(tasks: impl IntoIterator<Item = &'a Item>, today: Date) -> String {
    let columns = group_by_status(tasks);
    let mut out = String::new();
    for (index, status) in ItemStatus::iter().enumerate() {
        if index > 0 {
            out.push('\n');
        }
        let column = columns.column(status);
        let _ = writeln!(out, "{status} ({})", column.len());
        for item in column {
            let _ = writeln!(out, "  {}", format_item(item, today));
        }
    }
    out
}
