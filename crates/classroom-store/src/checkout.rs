//! Point-of-sale checkout.

use classroom_accounts::SessionUser;
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use crate::money::Amount;
use crate::StoreError;

/// One cart line: a product, how many, and the unit price shown at the till.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CartItem {
    /// Product id.
    pub id: i64,
    pub quantity: i64,
    pub price: Amount,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutRequest {
    #[serde(default)]
    pub items: Vec<CartItem>,
    #[serde(default = "default_payment_method")]
    pub payment_method: String,
}

fn default_payment_method() -> String {
    "cash".to_string()
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckoutReceipt {
    pub sale_id: i64,
    pub transaction_id: String,
    pub total_cents: i64,
}

struct Line {
    product_id: i64,
    quantity: i64,
    unit_cents: i64,
    total_cents: i64,
}

/// `TXN` + local timestamp + `-` + eight random hex digits.
fn generate_transaction_id() -> String {
    format!(
        "TXN{}-{:08x}",
        chrono::Local::now().format("%Y%m%d%H%M%S"),
        rand::random::<u32>()
    )
}

/// Records a sale: one header row, one line item per cart entry, and the
/// matching stock decrements, all in a single transaction.
///
/// Stock is not checked and may go negative. Any database failure rolls
/// the whole sale back and surfaces as [`StoreError::CheckoutFailed`].
pub fn checkout(
    conn: &Connection,
    cashier: &SessionUser,
    request: &CheckoutRequest,
) -> Result<CheckoutReceipt, StoreError> {
    if request.items.is_empty() {
        return Err(StoreError::Validation("No items in cart".to_string()));
    }

    let mut lines = Vec::with_capacity(request.items.len());
    let mut total_cents: i64 = 0;
    for item in &request.items {
        if item.quantity <= 0 {
            return Err(StoreError::Validation(format!(
                "Invalid quantity for product {}",
                item.id
            )));
        }
        let unit_cents = item.price.to_cents("price")?;
        let line_total = unit_cents
            .checked_mul(item.quantity)
            .ok_or_else(|| StoreError::Validation("Sale total is too large".to_string()))?;
        total_cents = total_cents
            .checked_add(line_total)
            .ok_or_else(|| StoreError::Validation("Sale total is too large".to_string()))?;
        lines.push(Line {
            product_id: item.id,
            quantity: item.quantity,
            unit_cents,
            total_cents: line_total,
        });
    }

    let payment_method = match request.payment_method.trim() {
        "" => "cash",
        m => m,
    };
    let transaction_id = generate_transaction_id();

    let sale_id = record_sale(
        conn,
        cashier.id,
        &transaction_id,
        total_cents,
        payment_method,
        &lines,
    )
    .map_err(|e| {
        tracing::warn!(error = %e, cashier_id = cashier.id, "checkout rolled back");
        StoreError::CheckoutFailed(e)
    })?;

    tracing::info!(
        sale_id,
        transaction_id = %transaction_id,
        total_cents,
        items = lines.len(),
        "sale completed"
    );
    Ok(CheckoutReceipt {
        sale_id,
        transaction_id,
        total_cents,
    })
}

fn record_sale(
    conn: &Connection,
    user_id: i64,
    transaction_id: &str,
    total_cents: i64,
    payment_method: &str,
    lines: &[Line],
) -> rusqlite::Result<i64> {
    // Dropping the transaction without commit rolls it back.
    let tx = conn.unchecked_transaction()?;
    tx.execute(
        "INSERT INTO sales (transaction_id, user_id, total_cents, payment_method)
         VALUES (?1, ?2, ?3, ?4)",
        params![transaction_id, user_id, total_cents, payment_method],
    )?;
    let sale_id = tx.last_insert_rowid();

    for line in lines {
        tx.execute(
            "INSERT INTO sale_items (sale_id, product_id, quantity, unit_price_cents, total_price_cents)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                sale_id,
                line.product_id,
                line.quantity,
                line.unit_cents,
                line.total_cents
            ],
        )?;
        tx.execute(
            "UPDATE products
             SET stock_quantity = stock_quantity - ?1, updated_at = CURRENT_TIMESTAMP
             WHERE id = ?2",
            params![line.quantity, line.product_id],
        )?;
    }

    tx.commit()?;
    Ok(sale_id)
}
