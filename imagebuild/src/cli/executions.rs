use clap::Args;
use log::info;

use crate::{
    aws::AwsCli,
    runner::{ExecutionRecord, JobRunner},
    time_ext::{self, OffsetDateTimeExt},
    Result,
};

#[derive(Debug, Args)]
pub struct ExecutionsArgs {
    /// The build project to list executions of.
    #[arg(long = "project")]
    project: String,

    /// The maximum number of executions to list.
    #[arg(long = "limit", default_value_t = 10, value_parser = clap::value_parser!(u16).range(1..=100))]
    limit: u16,
}

pub fn executions(aws: &AwsCli, args: ExecutionsArgs) -> Result<()> {
    use comfy_table::{Attribute, Cell, ContentArrangement, Table};

    let records = aws.recent_executions(&args.project, usize::from(args.limit))?;
    if records.is_empty() {
        info!("no executions found for {}", args.project);
        return Ok(());
    }

    // A named function pointer type lets the closures below share one array element type.
    type Accessor = fn(&ExecutionRecord) -> Result<Option<String>>;

    fn accessor(f: Accessor) -> Accessor {
        f
    }

    fn format_local(value: time::OffsetDateTime) -> Result<String> {
        Ok(time_ext::format_date_time(value.to_local()?)?)
    }

    let columns = [
        (
            "execution".to_string(),
            accessor(|row| Ok(Some(row.id.clone()))),
        ),
        (
            "status".to_string(),
            accessor(|row| Ok(Some(row.status.to_string()))),
        ),
        (
            format!(
                "started ({})",
                time_ext::format_offset(time_ext::local_offset()?)?
            ),
            accessor(|row| row.start_time.map(format_local).transpose()),
        ),
        (
            "duration".to_string(),
            accessor(|row| {
                Ok(match (row.start_time, row.end_time) {
                    (Some(start), Some(end)) => Some(time_ext::format_duration(end - start)),
                    (Some(start), None) if !row.status.is_terminal() => Some(format!(
                        "{} so far",
                        time_ext::format_duration(time::OffsetDateTime::now_utc() - start)
                    )),
                    _ => None,
                })
            }),
        ),
        (
            "logs".to_string(),
            accessor(|row| Ok(row.log_location.as_ref().map(ToString::to_string))),
        ),
    ];

    let (column_names, accessors): (Vec<_>, Vec<_>) = columns.into_iter().unzip();

    let mut table = Table::new();
    table
        .load_preset(comfy_table::presets::UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(
            column_names
                .into_iter()
                .map(|name| Cell::new(name).add_attribute(Attribute::Bold)),
        );

    for record in &records {
        // `Table::add_row` does not accept a Result, so collect to surface errors first.
        table.add_row(
            accessors
                .iter()
                .map(|f| f(record))
                .collect::<Result<Vec<_>>>()?
                .into_iter()
                .map(Option::unwrap_or_default),
        );
    }

    println!("{table}");

    Ok(())
}
