//! Customer rules: required name, valid unique email.

use common::{AppError, AppResult, CustomerId, ErrorCode, Page, PageRequest};
use store::{Customer, CustomerChanges, CustomerFilter, CustomerRepository, NewCustomer};

/// Trims and lowercases an email, then checks its shape.
pub fn normalize_email(raw: &str) -> AppResult<String> {
    let email = raw.trim().to_lowercase();
    if is_valid_email(&email) {
        Ok(email)
    } else {
        Err(AppError::service(
            ErrorCode::CustomerInvalidEmail,
            format!("invalid email address: {raw:?}"),
        ))
    }
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.contains('@')
        && !email.chars().any(char::is_whitespace)
        && domain.split('.').count() >= 2
        && domain.split('.').all(|label| !label.is_empty())
}

fn require_name(name: &str) -> AppResult<String> {
    let name = name.trim();
    if name.is_empty() {
        return Err(AppError::service(
            ErrorCode::ValidationRequiredField,
            "customer name is required",
        ));
    }
    Ok(name.to_string())
}

pub(crate) fn customer_not_found(id: CustomerId) -> AppError {
    AppError::service(
        ErrorCode::CustomerNotFound,
        format!("customer {id} not found"),
    )
}

fn email_exists(email: &str) -> AppError {
    AppError::service(
        ErrorCode::CustomerEmailExists,
        format!("a customer with email {email} already exists"),
    )
}

/// Service for customer records.
#[derive(Clone)]
pub struct CustomerService<S> {
    store: S,
}

impl<S: CustomerRepository> CustomerService<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_by_id(&self, id: CustomerId) -> AppResult<Customer> {
        self.store
            .get_customer(id)
            .await?
            .ok_or_else(|| customer_not_found(id))
    }

    #[tracing::instrument(skip(self))]
    pub async fn get_all(
        &self,
        filter: &CustomerFilter,
        page: PageRequest,
    ) -> AppResult<Page<Customer>> {
        self.store.list_customers(filter, page).await
    }

    /// Looks up a non-deleted customer by email, case-insensitively.
    pub async fn find_by_email(&self, email: &str) -> AppResult<Option<Customer>> {
        let email = normalize_email(email)?;
        self.store.get_customer_by_email(&email).await
    }

    /// Creates a customer.
    ///
    /// # Errors
    ///
    /// `VALIDATION_REQUIRED_FIELD` for a blank name, `CUSTOMER_INVALID_EMAIL`
    /// for a malformed email and `CUSTOMER_EMAIL_EXISTS` when a non-deleted
    /// customer already uses it.
    #[tracing::instrument(skip(self, input), fields(email = %input.email))]
    pub async fn create(&self, mut input: NewCustomer) -> AppResult<Customer> {
        input.name = require_name(&input.name)?;
        input.email = normalize_email(&input.email)?;

        if self.store.get_customer_by_email(&input.email).await?.is_some() {
            return Err(email_exists(&input.email));
        }

        let email = input.email.clone();
        let customer = self
            .store
            .insert_customer(input)
            .await
            .map_err(|e| unique_email_conflict(e, &email))?;

        metrics::counter!("customers_created_total").increment(1);
        tracing::info!(customer_id = %customer.id, "customer created");
        Ok(customer)
    }

    /// Returns the customer using `input.email`, creating it if there is none.
    pub async fn find_or_create(&self, input: NewCustomer) -> AppResult<Customer> {
        if let Some(existing) = self.find_by_email(&input.email).await? {
            tracing::debug!(customer_id = %existing.id, "reusing customer with matching email");
            return Ok(existing);
        }
        self.create(input).await
    }

    #[tracing::instrument(skip(self, changes))]
    pub async fn update(&self, id: CustomerId, mut changes: CustomerChanges) -> AppResult<Customer> {
        let current = self.get_by_id(id).await?;

        if let Some(name) = changes.name.as_deref() {
            changes.name = Some(require_name(name)?);
        }
        if let Some(raw) = changes.email.as_deref() {
            let email = normalize_email(raw)?;
            if email != current.email
                && let Some(other) = self.store.get_customer_by_email(&email).await?
                && other.id != id
            {
                return Err(email_exists(&email));
            }
            changes.email = Some(email);
        }

        let email = changes.email.clone().unwrap_or_default();
        self.store
            .update_customer(id, changes)
            .await
            .map_err(|e| unique_email_conflict(e, &email))?
            .ok_or_else(|| customer_not_found(id))
    }

    /// Soft-deletes the customer. Their historical orders keep resolving.
    #[tracing::instrument(skip(self))]
    pub async fn delete(&self, id: CustomerId) -> AppResult<()> {
        if !self.store.soft_delete_customer(id).await? {
            return Err(customer_not_found(id));
        }
        tracing::info!(customer_id = %id, "customer deleted");
        Ok(())
    }
}

/// A unique violation on insert/update lost a race with another writer.
fn unique_email_conflict(err: AppError, email: &str) -> AppError {
    if err.is(ErrorCode::DatabaseConstraintViolation) {
        email_exists(email)
    } else {
        err
    }
}
