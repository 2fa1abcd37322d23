//! Fixed table layouts shared by every backend.
//!
//! A [`TableSchema`] drives the row-file header, the SQLite `CREATE TABLE`
//! statement, and the Arrow schema used for columnar partitions.

use arrow_schema::{DataType, Field, Schema};

/// Storage type of a column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Text,
    /// Decimal values; SQLite `numeric` affinity, Arrow `Float64`.
    Numeric,
    Integer,
}

impl ColumnType {
    fn sql(&self) -> &'static str {
        match self {
            ColumnType::Text => "text",
            ColumnType::Numeric => "numeric",
            ColumnType::Integer => "integer",
        }
    }

    fn arrow(&self) -> DataType {
        match self {
            ColumnType::Text => DataType::Utf8,
            ColumnType::Numeric => DataType::Float64,
            ColumnType::Integer => DataType::Int64,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
}

/// A named, ordered column list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    name: String,
    columns: Vec<Column>,
}

impl TableSchema {
    pub fn new(name: impl Into<String>, columns: &[(&str, ColumnType)]) -> Self {
        Self {
            name: name.into(),
            columns: columns
                .iter()
                .map(|(name, ty)| Column {
                    name: (*name).to_string(),
                    ty: *ty,
                })
                .collect(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn width(&self) -> usize {
        self.columns.len()
    }

    /// Comma-separated column names.
    pub fn header(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.name.as_str())
            .collect::<Vec<_>>()
            .join(",")
    }

    pub fn create_sql(&self) -> String {
        let columns = self
            .columns
            .iter()
            .map(|c| format!("\"{}\" {}", c.name, c.ty.sql()))
            .collect::<Vec<_>>()
            .join(", ");
        format!("CREATE TABLE IF NOT EXISTS \"{}\" ({columns})", self.name)
    }

    pub fn insert_sql(&self) -> String {
        let placeholders = vec!["?"; self.columns.len()].join(", ");
        format!("INSERT INTO \"{}\" VALUES ({placeholders})", self.name)
    }

    /// All columns are nullable; cells that fail to parse become null.
    pub fn arrow_schema(&self) -> Schema {
        Schema::new(
            self.columns
                .iter()
                .map(|c| Field::new(c.name.as_str(), c.ty.arrow(), true))
                .collect::<Vec<_>>(),
        )
    }

    pub fn l1() -> Self {
        use ColumnType::{Numeric, Text};
        Self::new(
            "L1",
            &[
                ("timestamp", Text),
                ("symbol", Text),
                ("bid", Numeric),
                ("bid_qty", Numeric),
                ("ask", Numeric),
                ("ask_qty", Numeric),
                ("last", Numeric),
                ("volume", Numeric),
                ("vwap", Numeric),
                ("low", Numeric),
                ("high", Numeric),
                ("change", Numeric),
                ("change_pct", Numeric),
            ],
        )
    }

    /// Book rows with `depth` levels. The relational table leads with a
    /// `symbol` column; per-symbol files do not.
    pub fn l2(depth: usize, with_symbol: bool) -> Self {
        let mut columns = Vec::with_capacity(depth * 4 + 2);
        if with_symbol {
            columns.push(Column {
                name: "symbol".to_string(),
                ty: ColumnType::Text,
            });
        }
        columns.push(Column {
            name: "timestamp".to_string(),
            ty: ColumnType::Text,
        });
        for i in 0..depth {
            for prefix in ["ask_px", "ask_sz", "bid_px", "bid_sz"] {
                columns.push(Column {
                    name: format!("{prefix}_{i}"),
                    ty: ColumnType::Numeric,
                });
            }
        }
        Self {
            name: "L2".to_string(),
            columns,
        }
    }

    pub fn l3() -> Self {
        use ColumnType::{Numeric, Text};
        Self::new(
            "L3",
            &[
                ("side", Text),
                ("ts_event", Text),
                ("ts_recv", Text),
                ("price", Numeric),
                ("size", Numeric),
                ("action", Text),
                ("order_id", Text),
                ("symbol", Text),
            ],
        )
    }

    pub fn ohlc() -> Self {
        use ColumnType::{Integer, Numeric, Text};
        Self::new(
            "OHLC",
            &[
                ("timestamp", Text),
                ("symbol", Text),
                ("open", Numeric),
                ("high", Numeric),
                ("low", Numeric),
                ("close", Numeric),
                ("volume", Numeric),
                ("vwap", Numeric),
                ("trades", Integer),
                ("tstart", Text),
                ("ttrue", Text),
            ],
        )
    }

    pub fn trades() -> Self {
        use ColumnType::{Integer, Numeric, Text};
        Self::new(
            "trades",
            &[
                ("ts_event", Text),
                ("symbol", Text),
                ("price", Numeric),
                ("qty", Numeric),
                ("side", Text),
                ("ord_type", Text),
                ("trade_id", Integer),
            ],
        )
    }

    pub fn pairs() -> Self {
        let names = [
            "symbol",
            "base",
            "quote",
            "status",
            "qty_precision",
            "qty_increment",
            "price_precision",
            "cost_precision",
            "marginable",
            "has_index",
            "cost_min",
            "margin_initial",
            "position_limit_long",
            "position_limit_short",
            "tick_size",
            "price_increment",
            "qty_min",
        ];
        Self::text("kraken_pairs", &names)
    }

    pub fn assets() -> Self {
        let names = [
            "id",
            "status",
            "precision",
            "precision_display",
            "borrowable",
            "collateral_value",
            "margin_rate",
        ];
        Self::text("kraken_assets", &names)
    }

    fn text(name: &str, names: &[&str]) -> Self {
        let columns: Vec<(&str, ColumnType)> =
            names.iter().map(|n| (*n, ColumnType::Text)).collect();
        Self::new(name, &columns)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn l2_file_layout_interleaves_levels() {
        let schema = TableSchema::l2(10, false);
        assert_eq!(schema.width(), 41);
        assert!(
            schema
                .header()
                .starts_with("timestamp,ask_px_0,ask_sz_0,bid_px_0,bid_sz_0,ask_px_1")
        );
    }

    #[test]
    fn l2_table_leads_with_symbol() {
        let schema = TableSchema::l2(25, true);
        assert_eq!(schema.width(), 102);
        assert_eq!(schema.columns()[0].name, "symbol");
        assert_eq!(schema.columns()[1].name, "timestamp");
    }

    #[test]
    fn sql_statements_match_width() {
        let schema = TableSchema::trades();
        assert_eq!(
            schema.create_sql(),
            "CREATE TABLE IF NOT EXISTS \"trades\" (\"ts_event\" text, \"symbol\" text, \
             \"price\" numeric, \"qty\" numeric, \"side\" text, \"ord_type\" text, \
             \"trade_id\" integer)"
        );
        assert_eq!(schema.insert_sql().matches('?').count(), 7);
    }

    #[test]
    fn l3_header() {
        assert_eq!(
            TableSchema::l3().header(),
            "side,ts_event,ts_recv,price,size,action,order_id,symbol"
        );
    }
}
