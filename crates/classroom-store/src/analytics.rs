//! Sales reporting.

use chrono::NaiveDate;
use classroom_db::Query;
use rusqlite::Connection;
use serde::{Deserialize, Serialize};

use crate::StoreError;

/// Optional reporting window, inclusive, as `YYYY-MM-DD` dates. The window
/// only applies when both bounds are given.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DateRange {
    pub start_date: Option<String>,
    pub end_date: Option<String>,
}

impl DateRange {
    fn bounds(&self) -> Result<Option<(String, String)>, StoreError> {
        let non_blank = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };
        match (non_blank(&self.start_date), non_blank(&self.end_date)) {
            (Some(start), Some(end)) => {
                for date in [&start, &end] {
                    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|_| {
                        StoreError::Validation(format!("Invalid date: {date}"))
                    })?;
                }
                Ok(Some((start, end)))
            }
            _ => Ok(None),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SalesSummary {
    pub total_sales: i64,
    pub total_revenue_cents: i64,
    pub average_sale_cents: i64,
    /// Revenue minus the current cost of every unit sold.
    pub total_profit_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopProduct {
    pub product_id: i64,
    pub name: String,
    pub sku: Option<String>,
    pub total_sold: i64,
    pub total_revenue_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategorySales {
    pub category_name: String,
    pub total_sold: i64,
    pub total_revenue_cents: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DailySales {
    pub date: String,
    pub sales_count: i64,
    pub revenue_cents: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Analytics {
    pub summary: SalesSummary,
    pub top_products: Vec<TopProduct>,
    pub category_sales: Vec<CategorySales>,
    pub daily_sales: Vec<DailySales>,
}

fn within(query: Query, bounds: &Option<(String, String)>) -> Query {
    match bounds {
        Some((start, end)) => query
            .filter("DATE(s.created_at) >= ?", start.clone())
            .filter("DATE(s.created_at) <= ?", end.clone()),
        None => query,
    }
}

/// Summary, top ten products, revenue per category and up to thirty days
/// of daily totals, optionally restricted to `range`.
pub fn analytics(conn: &Connection, range: &DateRange) -> Result<Analytics, StoreError> {
    let bounds = range.bounds()?;

    let (total_sales, total_revenue_cents, average_sale_cents): (i64, i64, i64) = within(
        Query::new(
            "SELECT COUNT(*), COALESCE(SUM(s.total_cents), 0),
                COALESCE(CAST(ROUND(AVG(s.total_cents)) AS INTEGER), 0)
             FROM sales s",
        ),
        &bounds,
    )
    .fetch(conn, |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)))?
    .into_iter()
    .next()
    .unwrap_or((0, 0, 0));

    let cost_of_goods: i64 = within(
        Query::new(
            "SELECT COALESCE(SUM(si.quantity * p.cost_cents), 0)
             FROM sale_items si
             JOIN products p ON si.product_id = p.id
             JOIN sales s ON si.sale_id = s.id",
        ),
        &bounds,
    )
    .fetch(conn, |row| row.get(0))?
    .into_iter()
    .next()
    .unwrap_or(0);

    let top_products = within(
        Query::new(
            "SELECT p.id, p.name, p.sku, SUM(si.quantity) AS total_sold,
                SUM(si.total_price_cents)
             FROM sale_items si
             JOIN products p ON si.product_id = p.id
             JOIN sales s ON si.sale_id = s.id",
        ),
        &bounds,
    )
    .group_by("p.id, p.name, p.sku")
    .order_by("total_sold DESC, p.name")
    .limit(10)
    .fetch(conn, |row| {
        Ok(TopProduct {
            product_id: row.get(0)?,
            name: row.get(1)?,
            sku: row.get(2)?,
            total_sold: row.get(3)?,
            total_revenue_cents: row.get(4)?,
        })
    })?;

    let category_sales = within(
        Query::new(
            "SELECT c.name, SUM(si.quantity), SUM(si.total_price_cents) AS revenue
             FROM sale_items si
             JOIN products p ON si.product_id = p.id
             JOIN categories c ON p.category_id = c.id
             JOIN sales s ON si.sale_id = s.id",
        ),
        &bounds,
    )
    .group_by("c.id, c.name")
    .order_by("revenue DESC")
    .fetch(conn, |row| {
        Ok(CategorySales {
            category_name: row.get(0)?,
            total_sold: row.get(1)?,
            total_revenue_cents: row.get(2)?,
        })
    })?;

    let daily_sales = within(
        Query::new(
            "SELECT DATE(s.created_at) AS day, COUNT(*), SUM(s.total_cents) FROM sales s",
        ),
        &bounds,
    )
    .group_by("DATE(s.created_at)")
    .order_by("day DESC")
    .limit(30)
    .fetch(conn, |row| {
        Ok(DailySales {
            date: row.get(0)?,
            sales_count: row.get(1)?,
            revenue_cents: row.get(2)?,
        })
    })?;

    Ok(Analytics {
        summary: SalesSummary {
            total_sales,
            total_revenue_cents,
            average_sale_cents,
            total_profit_cents: total_revenue_cents - cost_of_goods,
        },
        top_products,
        category_sales,
        daily_sales,
    })
}
