//! School store inventory and point of sale.
//!
//! Staff maintain a product catalogue, ring up sales at the POS and review
//! analytics. All money is integer cents; see [`money`] for conversion of
//! client-supplied amounts.

mod analytics;
mod checkout;
pub mod money;

pub use analytics::{analytics, Analytics, CategorySales, DailySales, DateRange, SalesSummary, TopProduct};
pub use checkout::{checkout, CartItem, CheckoutReceipt, CheckoutRequest};

use classroom_db::{like_pattern, Query};
use classroom_types::SaleStatus;
use money::Amount;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("product not found: {0}")]
    NotFound(i64),
    #[error("{0}")]
    Validation(String),
    /// A checkout failed and was rolled back.
    #[error("Error processing sale")]
    CheckoutFailed(#[source] rusqlite::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: i64,
    pub name: String,
    pub description: Option<String>,
    pub price_cents: i64,
    pub cost_cents: i64,
    pub stock_quantity: i64,
    pub min_stock_level: i64,
    pub category_id: Option<i64>,
    pub category_name: Option<String>,
    pub sku: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// Product fields submitted by staff when adding or editing a product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProductInput {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    pub price: Option<Amount>,
    pub cost: Option<Amount>,
    #[serde(default)]
    pub stock_quantity: Option<i64>,
    #[serde(default)]
    pub min_stock_level: Option<i64>,
    #[serde(default)]
    pub category_id: Option<i64>,
    #[serde(default)]
    pub sku: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sale {
    pub id: i64,
    pub transaction_id: String,
    pub user_id: i64,
    pub cashier_name: String,
    pub total_cents: i64,
    pub payment_method: String,
    pub status: SaleStatus,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Dashboard {
    pub total_products: i64,
    pub low_stock_products: i64,
    pub recent_sales: Vec<Sale>,
    pub low_stock_items: Vec<Product>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminStats {
    pub total_users: i64,
    pub total_products: i64,
    pub total_sales: i64,
    pub low_stock_count: i64,
    pub recent_sales: Vec<Sale>,
}

const PRODUCT_SELECT: &str = "SELECT p.id, p.name, p.description, p.price_cents, p.cost_cents,
        p.stock_quantity, p.min_stock_level, p.category_id, c.name, p.sku,
        p.created_at, p.updated_at
    FROM products p
    LEFT JOIN categories c ON p.category_id = c.id";

const SALE_SELECT: &str = "SELECT s.id, s.transaction_id, s.user_id, u.username, s.total_cents,
        s.payment_method, s.status, s.created_at
    FROM sales s
    JOIN users u ON s.user_id = u.id";

fn map_product(row: &Row<'_>) -> rusqlite::Result<Product> {
    Ok(Product {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        price_cents: row.get(3)?,
        cost_cents: row.get(4)?,
        stock_quantity: row.get(5)?,
        min_stock_level: row.get(6)?,
        category_id: row.get(7)?,
        category_name: row.get(8)?,
        sku: row.get(9)?,
        created_at: row.get(10)?,
        updated_at: row.get(11)?,
    })
}

fn map_sale(row: &Row<'_>) -> rusqlite::Result<Sale> {
    Ok(Sale {
        id: row.get(0)?,
        transaction_id: row.get(1)?,
        user_id: row.get(2)?,
        cashier_name: row.get(3)?,
        total_cents: row.get(4)?,
        payment_method: row.get(5)?,
        status: row.get(6)?,
        created_at: row.get(7)?,
    })
}

fn recent_sales(conn: &Connection, limit: i64) -> rusqlite::Result<Vec<Sale>> {
    Query::new(SALE_SELECT)
        .order_by("s.created_at DESC, s.id DESC")
        .limit(limit)
        .fetch(conn, map_sale)
}

fn count(conn: &Connection, sql: &str) -> rusqlite::Result<i64> {
    conn.query_row(sql, [], |row| row.get(0))
}

pub fn dashboard(conn: &Connection) -> Result<Dashboard, StoreError> {
    let low_stock_items = Query::new(PRODUCT_SELECT)
        .filter_raw("p.stock_quantity <= p.min_stock_level")
        .order_by("p.stock_quantity ASC, p.name")
        .limit(5)
        .fetch(conn, map_product)?;
    Ok(Dashboard {
        total_products: count(conn, "SELECT COUNT(*) FROM products")?,
        low_stock_products: count(
            conn,
            "SELECT COUNT(*) FROM products WHERE stock_quantity <= min_stock_level",
        )?,
        recent_sales: recent_sales(conn, 5)?,
        low_stock_items,
    })
}

/// Products ordered by name, optionally narrowed by a search over name,
/// description and SKU, and by category.
pub fn list_products(
    conn: &Connection,
    search: Option<&str>,
    category_id: Option<i64>,
) -> Result<Vec<Product>, StoreError> {
    let search = search.map(str::trim).filter(|s| !s.is_empty());
    let products = Query::new(PRODUCT_SELECT)
        .filter_opt(
            "(p.name LIKE ? ESCAPE '\\' OR p.description LIKE ? ESCAPE '\\' OR p.sku LIKE ? ESCAPE '\\')",
            search.map(like_pattern),
        )
        .filter_opt("p.category_id = ?", category_id)
        .order_by("p.name")
        .fetch(conn, map_product)?;
    Ok(products)
}

/// Products that can be sold right now (stock above zero).
pub fn pos_products(conn: &Connection) -> Result<Vec<Product>, StoreError> {
    let products = Query::new(PRODUCT_SELECT)
        .filter_raw("p.stock_quantity > 0")
        .order_by("p.name")
        .fetch(conn, map_product)?;
    Ok(products)
}

pub fn get_product(conn: &Connection, id: i64) -> Result<Product, StoreError> {
    conn.query_row(&format!("{PRODUCT_SELECT} WHERE p.id = ?1"), [id], map_product)
        .optional()?
        .ok_or(StoreError::NotFound(id))
}

struct ValidProduct {
    name: String,
    description: String,
    price_cents: i64,
    cost_cents: i64,
    stock_quantity: i64,
    min_stock_level: i64,
    sku: Option<String>,
}

fn validate(input: &ProductInput) -> Result<ValidProduct, StoreError> {
    let name = input.name.trim();
    let (Some(price), Some(cost)) = (&input.price, &input.cost) else {
        return Err(StoreError::Validation(
            "Name, price, and cost are required".to_string(),
        ));
    };
    if name.is_empty() {
        return Err(StoreError::Validation(
            "Name, price, and cost are required".to_string(),
        ));
    }
    let stock_quantity = input.stock_quantity.unwrap_or(0);
    let min_stock_level = input.min_stock_level.unwrap_or(5);
    if min_stock_level < 0 {
        return Err(StoreError::Validation(
            "Invalid numeric value for min_stock_level".to_string(),
        ));
    }
    Ok(ValidProduct {
        name: name.to_string(),
        description: input.description.as_deref().unwrap_or("").trim().to_string(),
        price_cents: price.to_cents("price")?,
        cost_cents: cost.to_cents("cost")?,
        stock_quantity,
        min_stock_level,
        sku: input
            .sku
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string),
    })
}

/// A generated SKU: `SKU` + local timestamp + four random hex digits.
pub fn generate_sku() -> String {
    format!(
        "SKU{}{:04x}",
        chrono::Local::now().format("%Y%m%d%H%M%S"),
        rand::random::<u16>()
    )
}

/// Adds a product. A blank SKU is replaced by [`generate_sku`].
pub fn create_product(conn: &Connection, input: &ProductInput) -> Result<Product, StoreError> {
    let p = validate(input)?;
    let sku = p.sku.unwrap_or_else(generate_sku);
    conn.execute(
        "INSERT INTO products (name, description, price_cents, cost_cents, stock_quantity,
                               min_stock_level, category_id, sku)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            p.name,
            p.description,
            p.price_cents,
            p.cost_cents,
            p.stock_quantity,
            p.min_stock_level,
            input.category_id,
            sku
        ],
    )?;
    let id = conn.last_insert_rowid();
    tracing::info!(product_id = id, sku = %sku, "product added");
    get_product(conn, id)
}

/// Replaces every field of a product. A blank SKU keeps the current one.
pub fn update_product(
    conn: &Connection,
    id: i64,
    input: &ProductInput,
) -> Result<Product, StoreError> {
    let p = validate(input)?;
    let changed = conn.execute(
        "UPDATE products
         SET name = ?1, description = ?2, price_cents = ?3, cost_cents = ?4,
             stock_quantity = ?5, min_stock_level = ?6, category_id = ?7,
             sku = COALESCE(?8, sku), updated_at = CURRENT_TIMESTAMP
         WHERE id = ?9",
        params![
            p.name,
            p.description,
            p.price_cents,
            p.cost_cents,
            p.stock_quantity,
            p.min_stock_level,
            input.category_id,
            p.sku,
            id
        ],
    )?;
    if changed == 0 {
        return Err(StoreError::NotFound(id));
    }
    get_product(conn, id)
}

pub fn list_categories(conn: &Connection) -> Result<Vec<Category>, StoreError> {
    let mut stmt = conn.prepare("SELECT id, name, description FROM categories ORDER BY name")?;
    let rows = stmt.query_map([], |row| {
        Ok(Category {
            id: row.get(0)?,
            name: row.get(1)?,
            description: row.get(2)?,
        })
    })?;
    let mut categories = Vec::new();
    for row in rows {
        categories.push(row?);
    }
    Ok(categories)
}

pub fn admin_stats(conn: &Connection) -> Result<AdminStats, StoreError> {
    Ok(AdminStats {
        total_users: count(conn, "SELECT COUNT(*) FROM users")?,
        total_products: count(conn, "SELECT COUNT(*) FROM products")?,
        total_sales: count(conn, "SELECT COUNT(*) FROM sales")?,
        low_stock_count: count(
            conn,
            "SELECT COUNT(*) FROM products WHERE stock_quantity <= min_stock_level",
        )?,
        recent_sales: recent_sales(conn, 10)?,
    })
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use classroom_accounts::{register, NewUser, SessionUser};
    use classroom_types::{AppKind, Role};

    pub fn setup() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        conn.execute_batch("PRAGMA foreign_keys = ON;").unwrap();
        classroom_db::run_migrations(&conn, AppKind::Store).unwrap();
        conn
    }

    pub fn cashier(conn: &Connection) -> SessionUser {
        let u = register(
            conn,
            &NewUser {
                username: "cashier".to_string(),
                email: None,
                password: "pw".to_string(),
            },
            Role::Staff,
        )
        .unwrap();
        SessionUser {
            id: u.id,
            username: u.username,
            role: u.role,
        }
    }

    pub fn product(conn: &Connection, name: &str, price: &str, cost: &str, stock: i64) -> Product {
        create_product(
            conn,
            &ProductInput {
                name: name.to_string(),
                description: None,
                price: Some(Amount::Text(price.to_string())),
                cost: Some(Amount::Text(cost.to_string())),
                stock_quantity: Some(stock),
                min_stock_level: None,
                category_id: Some(1),
                sku: None,
            },
        )
        .unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;

    #[test]
    fn blank_sku_is_generated_and_duplicates_fail() {
        let conn = setup();
        let pen = product(&conn, "Pen", "1.50", "0.40", 10);
        let sku = pen.sku.clone().unwrap();
        assert!(sku.starts_with("SKU"));
        assert_eq!(sku.len(), 3 + 14 + 4);
        assert_eq!(pen.price_cents, 150);
        assert_eq!(pen.category_name.as_deref(), Some("School Supplies"));

        let mut dup = ProductInput {
            name: "Pen 2".to_string(),
            description: None,
            price: Some(Amount::Number(1.0)),
            cost: Some(Amount::Number(0.5)),
            stock_quantity: None,
            min_stock_level: None,
            category_id: None,
            sku: Some(sku),
        };
        let err = create_product(&conn, &dup).unwrap_err();
        match err {
            StoreError::Database(e) => assert!(classroom_db::is_unique_violation(&e)),
            other => panic!("unexpected error: {other:?}"),
        }

        dup.sku = Some("  ".to_string());
        let second = create_product(&conn, &dup).unwrap();
        assert_eq!(second.stock_quantity, 0);
        assert_eq!(second.min_stock_level, 5);
    }

    #[test]
    fn required_and_numeric_validation() {
        let conn = setup();
        let mut input = ProductInput {
            name: "Widget".to_string(),
            description: None,
            price: None,
            cost: Some(Amount::Number(1.0)),
            stock_quantity: None,
            min_stock_level: None,
            category_id: None,
            sku: None,
        };
        assert!(matches!(
            create_product(&conn, &input),
            Err(StoreError::Validation(_))
        ));
        input.price = Some(Amount::Text("abc".to_string()));
        assert!(matches!(
            create_product(&conn, &input),
            Err(StoreError::Validation(_))
        ));
    }

    #[test]
    fn update_keeps_sku_when_blank() {
        let conn = setup();
        let pen = product(&conn, "Pen", "1.50", "0.40", 10);
        let input = ProductInput {
            name: "Gel Pen".to_string(),
            description: Some("smooth".to_string()),
            price: Some(Amount::Text("2".to_string())),
            cost: Some(Amount::Text("0.5".to_string())),
            stock_quantity: Some(3),
            min_stock_level: Some(5),
            category_id: Some(1),
            sku: None,
        };
        let updated = update_product(&conn, pen.id, &input).unwrap();
        assert_eq!(updated.name, "Gel Pen");
        assert_eq!(updated.price_cents, 200);
        assert_eq!(updated.sku, pen.sku);
        assert!(matches!(
            update_product(&conn, 999, &input),
            Err(StoreError::NotFound(999))
        ));
    }

    #[test]
    fn listing_search_and_low_stock() {
        let conn = setup();
        product(&conn, "Notebook", "3", "1", 2);
        product(&conn, "Calculator", "20", "12", 50);
        product(&conn, "Sold out", "1", "1", 0);

        assert_eq!(list_products(&conn, Some("note"), None).unwrap().len(), 1);
        assert_eq!(list_products(&conn, None, Some(2)).unwrap().len(), 0);
        assert_eq!(list_products(&conn, Some("  "), None).unwrap().len(), 3);
        assert_eq!(pos_products(&conn).unwrap().len(), 2);

        let dash = dashboard(&conn).unwrap();
        assert_eq!(dash.total_products, 3);
        assert_eq!(dash.low_stock_products, 2);
        assert_eq!(dash.low_stock_items[0].name, "Sold out");
        assert_eq!(list_categories(&conn).unwrap().len(), 5);
    }
}
