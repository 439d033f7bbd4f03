use anyhow::{bail, Context as _, Result};
use scsync_core::{MirrorStore, Predicate, RowMap, TableSchema};

use super::sync::sync_consumer;
use crate::context::Context;

pub fn cmd_query(
    ctx: &Context,
    name: &str,
    table: &str,
    filter: Option<&str>,
    sync: bool,
    json: bool,
) -> Result<()> {
    let cfg = ctx.consumer_config(name)?;
    let consumer = ctx.resolve(cfg)?;

    let Some(schema) = consumer.decomposer.table(table) else {
        let tables: Vec<&str> = consumer
            .decomposer
            .tables()
            .iter()
            .map(|t| t.name.as_str())
            .collect();
        bail!(
            "Consumer '{}' has no table '{}'. Tables: {}",
            name,
            table,
            tables.join(", ")
        );
    };

    let predicate = parse_filter(schema, filter)?;
    let mut mirror = ctx.mirror()?;

    if sync {
        let mut checkpoints = ctx.checkpoints()?;
        sync_consumer(ctx, cfg, &mut checkpoints, &mut mirror)?;
    } else {
        mirror.ensure_tables(consumer.decomposer.tables())?;
    }

    let rows = mirror.query(schema, &predicate)?;

    if json {
        println!("{}", to_json(&rows)?);
    } else {
        print_table(schema, &rows);
    }
    Ok(())
}

/// Parse `--where`, rejecting columns the table does not have.
fn parse_filter(schema: &TableSchema, filter: Option<&str>) -> Result<Predicate> {
    let Some(filter) = filter else {
        return Ok(Predicate::True);
    };

    let predicate =
        Predicate::parse(filter).with_context(|| format!("Invalid --where '{}'", filter))?;
    for column in predicate.columns() {
        if schema.column(column).is_none() && !schema.is_key_column(column) {
            bail!("Table '{}' has no column '{}'", schema.name, column);
        }
    }
    Ok(predicate)
}

fn to_json(rows: &[RowMap]) -> Result<String> {
    let rows: Vec<serde_json::Value> = rows
        .iter()
        .map(|row| {
            serde_json::Value::Object(
                row.iter()
                    .map(|(k, v)| (k.clone(), v.clone().into()))
                    .collect(),
            )
        })
        .collect();
    Ok(serde_json::to_string_pretty(&rows)?)
}

fn print_table(schema: &TableSchema, rows: &[RowMap]) {
    let columns: Vec<&str> = schema.all_columns().map(|c| c.name.as_str()).collect();
    let cells: Vec<Vec<String>> = rows
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|c| row.get(*c).map(|v| v.to_string()).unwrap_or_default())
                .collect()
        })
        .collect();

    let widths: Vec<usize> = columns
        .iter()
        .enumerate()
        .map(|(i, c)| {
            cells
                .iter()
                .map(|r| r[i].len())
                .chain(std::iter::once(c.len()))
                .max()
                .unwrap_or(0)
        })
        .collect();

    let line = |values: Vec<&str>| {
        values
            .iter()
            .zip(&widths)
            .map(|(v, w)| format!("{:<width$}", v, width = w))
            .collect::<Vec<_>>()
            .join("  ")
    };

    println!("{}", line(columns.clone()));
    println!("{}", "-".repeat(widths.iter().sum::<usize>() + 2 * widths.len().saturating_sub(1)));
    for row in &cells {
        println!("{}", line(row.iter().map(String::as_str).collect()));
    }
    println!("\n{} row(s)", rows.len());
}

#[cfg(test)]
mod tests {
    use super::*;
    use scsync_core::{ColumnDef, Value};

    fn schema() -> TableSchema {
        TableSchema::new(
            "usernames",
            vec![ColumnDef::text("wallet_address")],
            vec![ColumnDef::text("name")],
        )
        .unwrap()
    }

    #[test]
    fn test_parse_filter_checks_columns() {
        assert_eq!(parse_filter(&schema(), None).unwrap(), Predicate::True);
        assert!(parse_filter(&schema(), Some("name = 'bob'")).is_ok());
        assert!(parse_filter(&schema(), Some("wallet_address != 'x'")).is_ok());

        let bids = TableSchema::new(
            "asset_trade_auction_bids",
            vec![ColumnDef::integer("auId"), ColumnDef::text("bidder")],
            vec![ColumnDef::integer("lockedAmount")],
        )
        .unwrap();
        let predicate = parse_filter(&bids, Some("auId = 3 and lockedAmount > 0")).unwrap();
        let mut row = RowMap::new();
        row.insert("auId".into(), Value::Int(3));
        row.insert("bidder".into(), Value::Text("deto1".into()));
        row.insert("lockedAmount".into(), Value::Int(5));
        assert!(predicate.evaluate(&row));

        let err = parse_filter(&schema(), Some("age > 3")).unwrap_err();
        assert!(err.to_string().contains("no column 'age'"));
        assert!(parse_filter(&schema(), Some("name =")).is_err());
    }

    #[test]
    fn test_to_json() {
        let mut row = RowMap::new();
        row.insert("wallet_address".into(), Value::Text("deto1".into()));
        row.insert("name".into(), Value::Null);

        let json: serde_json::Value = serde_json::from_str(&to_json(&[row]).unwrap()).unwrap();
        assert_eq!(json[0]["wallet_address"], "deto1");
        assert!(json[0]["name"].is_null());
    }
}
