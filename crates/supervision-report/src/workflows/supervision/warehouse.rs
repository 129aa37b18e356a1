use chrono::NaiveDate;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::runtime::Runtime;

use super::domain::{BillingRecord, CertificationRecord, DateRange, ServiceCodes};
use super::extract::{Warehouse, WarehouseError};
use super::queries::{BILLING_ENTRIES_SQL, CERTIFICATION_HOURS_SQL};

/// PostgreSQL-backed warehouse access. Owns a runtime so the pipeline can
/// stay synchronous.
pub struct SqlxWarehouse {
    pool: PgPool,
    codes: ServiceCodes,
    runtime: Runtime,
}

impl SqlxWarehouse {
    pub fn connect(url: &str, codes: ServiceCodes) -> Result<Self, WarehouseError> {
        let runtime = Runtime::new().map_err(|err| WarehouseError::Runtime(err.to_string()))?;
        let pool = runtime
            .block_on(
                PgPoolOptions::new()
                    .max_connections(1)
                    .acquire_timeout(Duration::from_secs(30))
                    .connect(url),
            )
            .map_err(|err| WarehouseError::Connection(err.to_string()))?;

        Ok(Self {
            pool,
            codes,
            runtime,
        })
    }

    fn map_query_error(err: sqlx::Error) -> WarehouseError {
        match err {
            sqlx::Error::Io(_)
            | sqlx::Error::Tls(_)
            | sqlx::Error::PoolTimedOut
            | sqlx::Error::PoolClosed => WarehouseError::Connection(err.to_string()),
            other => WarehouseError::Query(other.to_string()),
        }
    }
}

impl std::fmt::Debug for SqlxWarehouse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SqlxWarehouse").finish_non_exhaustive()
    }
}

impl Warehouse for SqlxWarehouse {
    fn fetch_billing(&self, range: &DateRange) -> Result<Vec<BillingRecord>, WarehouseError> {
        let rows = self
            .runtime
            .block_on(
                sqlx::query_as::<_, BillingRow>(BILLING_ENTRIES_SQL)
                    .bind(range.start())
                    .bind(range.end())
                    .bind(&self.codes.direct)
                    .bind(&self.codes.supervision)
                    .fetch_all(&self.pool),
            )
            .map_err(Self::map_query_error)?;

        Ok(rows.into_iter().map(BillingRecord::from).collect())
    }

    fn fetch_certification(
        &self,
        range: &DateRange,
    ) -> Result<Vec<CertificationRecord>, WarehouseError> {
        let rows = self
            .runtime
            .block_on(
                sqlx::query_as::<_, CertificationRow>(CERTIFICATION_HOURS_SQL)
                    .bind(range.start())
                    .bind(range.end())
                    .bind(&self.codes.certification)
                    .fetch_all(&self.pool),
            )
            .map_err(Self::map_query_error)?;

        Ok(rows.into_iter().map(CertificationRecord::from).collect())
    }
}

#[derive(Debug, sqlx::FromRow)]
struct BillingRow {
    client_id: Option<String>,
    client_name: Option<String>,
    provider_id: Option<String>,
    provider_name: Option<String>,
    service_location: Option<String>,
    service_code: Option<String>,
    service_date: Option<NaiveDate>,
    billed_hours: Option<f64>,
    supervised_provider_id: Option<String>,
    supervised_service_location: Option<String>,
}

impl From<BillingRow> for BillingRecord {
    fn from(row: BillingRow) -> Self {
        Self {
            client_id: row.client_id,
            client_name: row.client_name,
            provider_id: row.provider_id,
            provider_name: row.provider_name,
            service_location: row.service_location,
            service_code: row.service_code,
            service_date: row.service_date,
            billed_hours: row.billed_hours,
            supervised_provider_id: row.supervised_provider_id,
            supervised_service_location: row.supervised_service_location,
        }
    }
}

#[derive(Debug, sqlx::FromRow)]
struct CertificationRow {
    provider_id: Option<String>,
    provider_name: Option<String>,
    certification_hours: Option<f64>,
    period_start: Option<NaiveDate>,
    period_end: Option<NaiveDate>,
}

impl From<CertificationRow> for CertificationRecord {
    fn from(row: CertificationRow) -> Self {
        Self {
            provider_id: row.provider_id,
            provider_name: row.provider_name,
            certification_hours: row.certification_hours,
            period_start: row.period_start,
            period_end: row.period_end,
        }
    }
}
