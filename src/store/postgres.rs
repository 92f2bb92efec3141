//! PostgreSQL store implementation over sqlx.
//!
//! Status transitions are `UPDATE ... WHERE status = expected` so two
//! concurrent updates to the same row cannot both win. The delivery/order
//! dual write runs in one transaction.

use async_trait::async_trait;
use sqlx::{PgPool, Row};
use sqlx::postgres::PgRow;

use crate::error::AppError;
use crate::models::{
    CartItem, Delivery, DeliveryOption, DeliveryStatus, Listing, Money, NewOrder, Order,
    OrderItem, OrderStatus, PaymentSession, SessionOutcome, User,
};
use crate::store::Store;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn order_items(&self, order_id: i64) -> Result<Vec<OrderItem>, AppError> {
        let rows = sqlx::query(
            "SELECT medicine_id, quantity, unit_price_cents FROM order_items WHERE order_id = $1 ORDER BY medicine_id",
        )
        .bind(order_id)
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(order_item_from_row).collect()
    }

    async fn hydrate_orders(&self, rows: Vec<PgRow>) -> Result<Vec<Order>, AppError> {
        let mut orders = Vec::with_capacity(rows.len());
        for row in rows {
            let mut order = order_from_row(&row)?;
            order.items = self.order_items(order.id).await?;
            orders.push(order);
        }
        Ok(orders)
    }
}

fn user_from_row(row: &PgRow) -> Result<User, AppError> {
    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role: row.try_get("role")?,
        created_at: row.try_get("created_at")?,
    })
}

fn listing_from_row(row: &PgRow) -> Result<Listing, AppError> {
    Ok(Listing {
        pharmacy_id: row.try_get("pharmacy_id")?,
        medicine_id: row.try_get("medicine_id")?,
        medicine_name: row.try_get("medicine_name")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn cart_item_from_row(row: &PgRow) -> Result<CartItem, AppError> {
    Ok(CartItem {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        pharmacy_id: row.try_get("pharmacy_id")?,
        medicine_id: row.try_get("medicine_id")?,
        quantity: row.try_get("quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn order_item_from_row(row: &PgRow) -> Result<OrderItem, AppError> {
    Ok(OrderItem {
        medicine_id: row.try_get("medicine_id")?,
        quantity: row.try_get("quantity")?,
        unit_price: Money::from_cents(row.try_get("unit_price_cents")?),
    })
}

fn order_from_row(row: &PgRow) -> Result<Order, AppError> {
    let status: String = row.try_get("status")?;
    let option: String = row.try_get("delivery_option")?;
    Ok(Order {
        id: row.try_get("id")?,
        customer_id: row.try_get("customer_id")?,
        pharmacy_id: row.try_get("pharmacy_id")?,
        items: Vec::new(),
        total_price: Money::from_cents(row.try_get("total_price_cents")?),
        delivery_option: DeliveryOption::parse(&option)
            .ok_or_else(|| AppError::internal(format!("Bad delivery_option '{option}' in store")))?,
        delivery_address: row.try_get("delivery_address")?,
        status: OrderStatus::parse(&status)
            .ok_or_else(|| AppError::internal(format!("Bad order status '{status}' in store")))?,
        transaction_id: row.try_get("transaction_id")?,
        paid_at: row.try_get("paid_at")?,
    })
}

fn delivery_from_row(row: &PgRow) -> Result<Delivery, AppError> {
    let status: String = row.try_get("status")?;
    Ok(Delivery {
        id: row.try_get("id")?,
        order_id: row.try_get("order_id")?,
        address: row.try_get("address")?,
        delivery_person: row.try_get("delivery_person")?,
        status: DeliveryStatus::parse(&status)
            .ok_or_else(|| AppError::internal(format!("Bad delivery status '{status}' in store")))?,
    })
}

fn session_from_row(row: &PgRow) -> Result<PaymentSession, AppError> {
    let outcome: String = row.try_get("outcome")?;
    let option: String = row.try_get("delivery_option")?;
    let snapshot: serde_json::Value = row.try_get("snapshot")?;
    let totals: serde_json::Value = row.try_get("totals")?;
    Ok(PaymentSession {
        transaction_id: row.try_get("transaction_id")?,
        customer_id: row.try_get("customer_id")?,
        snapshot: serde_json::from_value(snapshot)
            .map_err(|e| AppError::internal(format!("Bad session snapshot in store: {e}")))?,
        totals: serde_json::from_value(totals)
            .map_err(|e| AppError::internal(format!("Bad session totals in store: {e}")))?,
        delivery_option: DeliveryOption::parse(&option)
            .ok_or_else(|| AppError::internal(format!("Bad delivery_option '{option}' in store")))?,
        delivery_address: row.try_get("delivery_address")?,
        gateway_session_id: row.try_get("gateway_session_id")?,
        outcome: SessionOutcome::parse(&outcome)
            .ok_or_else(|| AppError::internal(format!("Bad session outcome '{outcome}' in store")))?,
        order_ids: row.try_get("order_ids")?,
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: &str,
    ) -> Result<User, AppError> {
        let row = sqlx::query(
            "INSERT INTO users (username, password_hash, role) VALUES ($1, $2, $3)
             RETURNING id, username, password_hash, role, created_at",
        )
        .bind(username)
        .bind(password_hash)
        .bind(role)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db) = e.as_database_error() {
                if db.code().as_deref() == Some("23505") {
                    return AppError::conflict("Username already exists");
                }
            }
            AppError::db(e)
        })?;
        user_from_row(&row)
    }

    async fn user_by_username(&self, username: &str) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn user_by_id(&self, id: i64) -> Result<Option<User>, AppError> {
        let row = sqlx::query(
            "SELECT id, username, password_hash, role, created_at FROM users WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    async fn upsert_listing(&self, listing: Listing) -> Result<Listing, AppError> {
        let row = sqlx::query(
            "INSERT INTO pharmacy_listings (pharmacy_id, medicine_id, medicine_name, unit_price_cents)
             VALUES ($1, $2, $3, $4)
             ON CONFLICT (pharmacy_id, medicine_id)
             DO UPDATE SET medicine_name = EXCLUDED.medicine_name, unit_price_cents = EXCLUDED.unit_price_cents
             RETURNING pharmacy_id, medicine_id, medicine_name, unit_price_cents",
        )
        .bind(listing.pharmacy_id)
        .bind(listing.medicine_id)
        .bind(&listing.medicine_name)
        .bind(listing.unit_price.cents())
        .fetch_one(&self.pool)
        .await?;
        listing_from_row(&row)
    }

    async fn remove_listing(&self, pharmacy_id: i64, medicine_id: i64) -> Result<bool, AppError> {
        let res = sqlx::query(
            "DELETE FROM pharmacy_listings WHERE pharmacy_id = $1 AND medicine_id = $2",
        )
        .bind(pharmacy_id)
        .bind(medicine_id)
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() > 0)
    }

    async fn listings_for_pharmacy(&self, pharmacy_id: i64) -> Result<Vec<Listing>, AppError> {
        let rows = sqlx::query(
            "SELECT pharmacy_id, medicine_id, medicine_name, unit_price_cents
             FROM pharmacy_listings WHERE pharmacy_id = $1 ORDER BY medicine_id",
        )
        .bind(pharmacy_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(listing_from_row).collect()
    }

    async fn listing(
        &self,
        pharmacy_id: i64,
        medicine_id: i64,
    ) -> Result<Option<Listing>, AppError> {
        let row = sqlx::query(
            "SELECT pharmacy_id, medicine_id, medicine_name, unit_price_cents
             FROM pharmacy_listings WHERE pharmacy_id = $1 AND medicine_id = $2",
        )
        .bind(pharmacy_id)
        .bind(medicine_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(listing_from_row).transpose()
    }

    async fn cart_items(&self, customer_id: i64) -> Result<Vec<CartItem>, AppError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, pharmacy_id, medicine_id, quantity, unit_price_cents
             FROM cart_items WHERE customer_id = $1 ORDER BY id",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(cart_item_from_row).collect()
    }

    async fn add_cart_item(
        &self,
        customer_id: i64,
        pharmacy_id: i64,
        medicine_id: i64,
        quantity: i32,
        unit_price: Money,
    ) -> Result<CartItem, AppError> {
        // Re-adding the same listing folds into the existing line; the
        // price snapshot of the first add wins.
        let row = sqlx::query(
            "INSERT INTO cart_items (customer_id, pharmacy_id, medicine_id, quantity, unit_price_cents)
             VALUES ($1, $2, $3, $4, $5)
             ON CONFLICT (customer_id, pharmacy_id, medicine_id)
             DO UPDATE SET quantity = cart_items.quantity + EXCLUDED.quantity
             RETURNING id, customer_id, pharmacy_id, medicine_id, quantity, unit_price_cents",
        )
        .bind(customer_id)
        .bind(pharmacy_id)
        .bind(medicine_id)
        .bind(quantity)
        .bind(unit_price.cents())
        .fetch_one(&self.pool)
        .await?;
        cart_item_from_row(&row)
    }

    async fn set_cart_item_quantity(
        &self,
        customer_id: i64,
        item_id: i64,
        quantity: i32,
    ) -> Result<CartItem, AppError> {
        let row = sqlx::query(
            "UPDATE cart_items SET quantity = $3 WHERE id = $1 AND customer_id = $2
             RETURNING id, customer_id, pharmacy_id, medicine_id, quantity, unit_price_cents",
        )
        .bind(item_id)
        .bind(customer_id)
        .bind(quantity)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::not_found("Cart item not found"))?;
        cart_item_from_row(&row)
    }

    async fn remove_cart_item(&self, customer_id: i64, item_id: i64) -> Result<(), AppError> {
        let res = sqlx::query("DELETE FROM cart_items WHERE id = $1 AND customer_id = $2")
            .bind(item_id)
            .bind(customer_id)
            .execute(&self.pool)
            .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::not_found("Cart item not found"));
        }
        Ok(())
    }

    async fn remove_cart_items(&self, customer_id: i64, item_ids: &[i64]) -> Result<(), AppError> {
        sqlx::query("DELETE FROM cart_items WHERE customer_id = $1 AND id = ANY($2)")
            .bind(customer_id)
            .bind(item_ids)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn insert_session(&self, session: PaymentSession) -> Result<(), AppError> {
        let snapshot = serde_json::to_value(&session.snapshot)
            .map_err(|e| AppError::internal(format!("Session snapshot encode: {e}")))?;
        let totals = serde_json::to_value(session.totals)
            .map_err(|e| AppError::internal(format!("Session totals encode: {e}")))?;
        sqlx::query(
            "INSERT INTO payment_sessions
               (transaction_id, customer_id, snapshot, totals, delivery_option, delivery_address,
                gateway_session_id, outcome, order_ids)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)",
        )
        .bind(&session.transaction_id)
        .bind(session.customer_id)
        .bind(snapshot)
        .bind(totals)
        .bind(session.delivery_option.as_str())
        .bind(&session.delivery_address)
        .bind(&session.gateway_session_id)
        .bind(session.outcome.as_str())
        .bind(&session.order_ids)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db) = e.as_database_error() {
                if db.code().as_deref() == Some("23505") {
                    return AppError::conflict("Payment session already exists");
                }
            }
            AppError::db(e)
        })?;
        Ok(())
    }

    async fn session(&self, transaction_id: &str) -> Result<Option<PaymentSession>, AppError> {
        let row = sqlx::query(
            "SELECT transaction_id, customer_id, snapshot, totals, delivery_option,
                    delivery_address, gateway_session_id, outcome, order_ids
             FROM payment_sessions WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(session_from_row).transpose()
    }

    async fn resolve_session(
        &self,
        transaction_id: &str,
        outcome: SessionOutcome,
    ) -> Result<bool, AppError> {
        let res = sqlx::query(
            "UPDATE payment_sessions SET outcome = $2
             WHERE transaction_id = $1 AND outcome = 'pending'",
        )
        .bind(transaction_id)
        .bind(outcome.as_str())
        .execute(&self.pool)
        .await?;
        if res.rows_affected() > 0 {
            return Ok(true);
        }
        // Distinguish "already terminal" from "no such session".
        if self.session(transaction_id).await?.is_none() {
            return Err(AppError::not_found("Payment session not found"));
        }
        Ok(false)
    }

    async fn record_session_orders(
        &self,
        transaction_id: &str,
        order_ids: &[i64],
    ) -> Result<(), AppError> {
        let res = sqlx::query(
            "UPDATE payment_sessions SET order_ids = $2 WHERE transaction_id = $1",
        )
        .bind(transaction_id)
        .bind(order_ids)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() == 0 {
            return Err(AppError::not_found("Payment session not found"));
        }
        Ok(())
    }

    async fn insert_order(&self, order: NewOrder) -> Result<Order, AppError> {
        let mut tx = self.pool.begin().await?;

        for item in &order.items {
            let listed: Option<PgRow> = sqlx::query(
                "SELECT 1 AS one FROM pharmacy_listings WHERE pharmacy_id = $1 AND medicine_id = $2",
            )
            .bind(order.pharmacy_id)
            .bind(item.medicine_id)
            .fetch_optional(&mut *tx)
            .await?;
            if listed.is_none() {
                return Err(AppError::not_found(format!(
                    "Medicine {} is no longer listed by pharmacy {}",
                    item.medicine_id, order.pharmacy_id
                )));
            }
        }

        let row = sqlx::query(
            "INSERT INTO orders
               (customer_id, pharmacy_id, total_price_cents, delivery_option, delivery_address,
                status, transaction_id, paid_at)
             VALUES ($1, $2, $3, $4, $5, 'pending', $6, $7)
             RETURNING id, customer_id, pharmacy_id, total_price_cents, delivery_option,
                       delivery_address, status, transaction_id, paid_at",
        )
        .bind(order.customer_id)
        .bind(order.pharmacy_id)
        .bind(order.total_price.cents())
        .bind(order.delivery_option.as_str())
        .bind(&order.delivery_address)
        .bind(&order.transaction_id)
        .bind(order.paid_at)
        .fetch_one(&mut *tx)
        .await?;
        let mut created = order_from_row(&row)?;

        for item in &order.items {
            sqlx::query(
                "INSERT INTO order_items (order_id, medicine_id, quantity, unit_price_cents)
                 VALUES ($1, $2, $3, $4)",
            )
            .bind(created.id)
            .bind(item.medicine_id)
            .bind(item.quantity)
            .bind(item.unit_price.cents())
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        created.items = order.items;
        Ok(created)
    }

    async fn order(&self, id: i64) -> Result<Option<Order>, AppError> {
        let row = sqlx::query(
            "SELECT id, customer_id, pharmacy_id, total_price_cents, delivery_option,
                    delivery_address, status, transaction_id, paid_at
             FROM orders WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        match row {
            Some(row) => {
                let mut order = order_from_row(&row)?;
                order.items = self.order_items(order.id).await?;
                Ok(Some(order))
            }
            None => Ok(None),
        }
    }

    async fn orders_for_customer(&self, customer_id: i64) -> Result<Vec<Order>, AppError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, pharmacy_id, total_price_cents, delivery_option,
                    delivery_address, status, transaction_id, paid_at
             FROM orders WHERE customer_id = $1 ORDER BY id DESC",
        )
        .bind(customer_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_orders(rows).await
    }

    async fn orders_for_pharmacy(&self, pharmacy_id: i64) -> Result<Vec<Order>, AppError> {
        let rows = sqlx::query(
            "SELECT id, customer_id, pharmacy_id, total_price_cents, delivery_option,
                    delivery_address, status, transaction_id, paid_at
             FROM orders WHERE pharmacy_id = $1 ORDER BY id DESC",
        )
        .bind(pharmacy_id)
        .fetch_all(&self.pool)
        .await?;
        self.hydrate_orders(rows).await
    }

    async fn transition_order(
        &self,
        id: i64,
        expected: OrderStatus,
        next: OrderStatus,
    ) -> Result<bool, AppError> {
        let res = sqlx::query("UPDATE orders SET status = $3 WHERE id = $1 AND status = $2")
            .bind(id)
            .bind(expected.as_str())
            .bind(next.as_str())
            .execute(&self.pool)
            .await?;
        if res.rows_affected() > 0 {
            return Ok(true);
        }
        if self.order(id).await?.is_none() {
            return Err(AppError::not_found("Reservation not found"));
        }
        Ok(false)
    }

    async fn insert_delivery(
        &self,
        order_id: i64,
        address: &str,
        delivery_person: Option<&str>,
    ) -> Result<Delivery, AppError> {
        let row = sqlx::query(
            "INSERT INTO deliveries (order_id, address, delivery_person, status)
             VALUES ($1, $2, $3, 'pending')
             RETURNING id, order_id, address, delivery_person, status",
        )
        .bind(order_id)
        .bind(address)
        .bind(delivery_person)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| {
            if let Some(db) = e.as_database_error() {
                if db.code().as_deref() == Some("23505") {
                    return AppError::conflict("Delivery already exists for this reservation");
                }
            }
            AppError::db(e)
        })?;
        delivery_from_row(&row)
    }

    async fn delivery(&self, id: i64) -> Result<Option<Delivery>, AppError> {
        let row = sqlx::query(
            "SELECT id, order_id, address, delivery_person, status FROM deliveries WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn delivery_for_order(&self, order_id: i64) -> Result<Option<Delivery>, AppError> {
        let row = sqlx::query(
            "SELECT id, order_id, address, delivery_person, status FROM deliveries WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(delivery_from_row).transpose()
    }

    async fn transition_delivery(
        &self,
        id: i64,
        expected: DeliveryStatus,
        next: DeliveryStatus,
        delivery_person: Option<&str>,
    ) -> Result<bool, AppError> {
        let res = sqlx::query(
            "UPDATE deliveries
             SET status = $3, delivery_person = COALESCE($4, delivery_person)
             WHERE id = $1 AND status = $2",
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(next.as_str())
        .bind(delivery_person)
        .execute(&self.pool)
        .await?;
        if res.rows_affected() > 0 {
            return Ok(true);
        }
        if self.delivery(id).await?.is_none() {
            return Err(AppError::not_found("Delivery not found"));
        }
        Ok(false)
    }

    async fn complete_delivery(
        &self,
        id: i64,
        delivery_person: Option<&str>,
    ) -> Result<(Delivery, Order), AppError> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query(
            "SELECT order_id, status FROM deliveries WHERE id = $1 FOR UPDATE",
        )
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| AppError::not_found("Delivery not found"))?;
        let order_id: i64 = row.try_get("order_id")?;
        let status: String = row.try_get("status")?;
        if status != "out_for_delivery" {
            return Err(AppError::invalid_transition(status, "delivered"));
        }

        let moved = sqlx::query(
            "UPDATE deliveries
             SET status = 'delivered', delivery_person = COALESCE($2, delivery_person)
             WHERE id = $1 AND status = 'out_for_delivery'",
        )
        .bind(id)
        .bind(delivery_person)
        .execute(&mut *tx)
        .await?;
        let order_moved = sqlx::query(
            "UPDATE orders SET status = 'delivered' WHERE id = $1 AND status = 'accepted'",
        )
        .bind(order_id)
        .execute(&mut *tx)
        .await?;
        if moved.rows_affected() == 0 || order_moved.rows_affected() == 0 {
            // Dropping the transaction rolls both updates back.
            return Err(AppError::conflict("Delivery completion raced another update"));
        }

        tx.commit().await?;

        let delivery = self
            .delivery(id)
            .await?
            .ok_or_else(|| AppError::not_found("Delivery not found"))?;
        let order = self
            .order(order_id)
            .await?
            .ok_or_else(|| AppError::not_found("Reservation not found"))?;
        Ok((delivery, order))
    }
}
