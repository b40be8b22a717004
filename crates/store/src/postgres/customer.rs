use async_trait::async_trait;
use common::{AppResult, CustomerId, Page, PageRequest};
use sqlx::{Postgres, QueryBuilder, Row, postgres::PgRow};
use uuid::Uuid;

use super::{PostgresStore, contains_pattern};
use crate::error::db_error;
use crate::models::{Customer, CustomerChanges, CustomerFilter, NewCustomer};
use crate::repository::CustomerRepository;

pub(super) const CUSTOMER_COLUMNS: &str = "id, name, email, phone, address, city, state, \
     postal_code, country, tax_id, company, is_active, is_deleted, created_at, updated_at";

pub(super) fn row_to_customer(row: &PgRow) -> sqlx::Result<Customer> {
    Ok(Customer {
        id: CustomerId::from_uuid(row.try_get::<Uuid, _>("id")?),
        name: row.try_get("name")?,
        email: row.try_get("email")?,
        phone: row.try_get("phone")?,
        address: row.try_get("address")?,
        city: row.try_get("city")?,
        state: row.try_get("state")?,
        postal_code: row.try_get("postal_code")?,
        country: row.try_get("country")?,
        tax_id: row.try_get("tax_id")?,
        company: row.try_get("company")?,
        is_active: row.try_get("is_active")?,
        is_deleted: row.try_get("is_deleted")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

fn push_filter(qb: &mut QueryBuilder<'_, Postgres>, filter: &CustomerFilter) {
    qb.push(" WHERE NOT is_deleted");
    if let Some(search) = &filter.search {
        let pattern = contains_pattern(search);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR email ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR company ILIKE ")
            .push_bind(pattern)
            .push(")");
    }
    if let Some(is_active) = filter.is_active {
        qb.push(" AND is_active = ").push_bind(is_active);
    }
    if let Some(city) = &filter.city {
        qb.push(" AND LOWER(city) = LOWER(")
            .push_bind(city.clone())
            .push(")");
    }
}

fn optional_customer(row: Option<PgRow>) -> AppResult<Option<Customer>> {
    row.as_ref()
        .map(row_to_customer)
        .transpose()
        .map_err(db_error)
}

#[async_trait]
impl CustomerRepository for PostgresStore {
    async fn get_customer(&self, id: CustomerId) -> AppResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE id = $1 AND NOT is_deleted"
        ))
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        optional_customer(row)
    }

    async fn get_customer_by_email(&self, email: &str) -> AppResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            "SELECT {CUSTOMER_COLUMNS} FROM customers WHERE LOWER(email) = LOWER($1) AND NOT is_deleted"
        ))
        .bind(email)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        optional_customer(row)
    }

    async fn list_customers(
        &self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> AppResult<Page<Customer>> {
        let mut count_query = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM customers");
        push_filter(&mut count_query, filter);
        let total = count_query
            .build_query_scalar::<i64>()
            .fetch_one(&self.pool)
            .await
            .map_err(db_error)?;

        let mut query =
            QueryBuilder::<Postgres>::new(format!("SELECT {CUSTOMER_COLUMNS} FROM customers"));
        push_filter(&mut query, filter);
        query
            .push(" ORDER BY name ASC, id ASC LIMIT ")
            .push_bind(i64::from(page.limit))
            .push(" OFFSET ")
            .push_bind(page.offset() as i64);
        let rows = query.build().fetch_all(&self.pool).await.map_err(db_error)?;

        let customers = rows
            .iter()
            .map(row_to_customer)
            .collect::<sqlx::Result<Vec<_>>>()
            .map_err(db_error)?;
        Ok(Page::new(customers, page, u64::try_from(total).unwrap_or_default()))
    }

    async fn insert_customer(&self, customer: NewCustomer) -> AppResult<Customer> {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO customers (id, name, email, phone, address, city, state, postal_code, country, tax_id, company)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(Uuid::new_v4())
        .bind(&customer.name)
        .bind(&customer.email)
        .bind(&customer.phone)
        .bind(&customer.address)
        .bind(&customer.city)
        .bind(&customer.state)
        .bind(&customer.postal_code)
        .bind(&customer.country)
        .bind(&customer.tax_id)
        .bind(&customer.company)
        .fetch_one(&self.pool)
        .await
        .map_err(db_error)?;

        row_to_customer(&row).map_err(db_error)
    }

    async fn update_customer(
        &self,
        id: CustomerId,
        changes: CustomerChanges,
    ) -> AppResult<Option<Customer>> {
        let row = sqlx::query(&format!(
            r#"
            UPDATE customers SET
                name = COALESCE($2, name),
                email = COALESCE($3, email),
                phone = COALESCE($4, phone),
                address = COALESCE($5, address),
                city = COALESCE($6, city),
                state = COALESCE($7, state),
                postal_code = COALESCE($8, postal_code),
                country = COALESCE($9, country),
                tax_id = COALESCE($10, tax_id),
                company = COALESCE($11, company),
                is_active = COALESCE($12, is_active),
                updated_at = NOW()
            WHERE id = $1 AND NOT is_deleted
            RETURNING {CUSTOMER_COLUMNS}
            "#
        ))
        .bind(id.as_uuid())
        .bind(changes.name)
        .bind(changes.email)
        .bind(changes.phone)
        .bind(changes.address)
        .bind(changes.city)
        .bind(changes.state)
        .bind(changes.postal_code)
        .bind(changes.country)
        .bind(changes.tax_id)
        .bind(changes.company)
        .bind(changes.is_active)
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        optional_customer(row)
    }

    async fn soft_delete_customer(&self, id: CustomerId) -> AppResult<bool> {
        let rows_affected = sqlx::query(
            "UPDATE customers SET is_deleted = TRUE, is_active = FALSE, updated_at = NOW() \
             WHERE id = $1 AND NOT is_deleted",
        )
        .bind(id.as_uuid())
        .execute(&self.pool)
        .await
        .map_err(db_error)?
        .rows_affected();

        Ok(rows_affected > 0)
    }
}
