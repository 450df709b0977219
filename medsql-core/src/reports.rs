//! Predefined hospital reports.
//!
//! Reports are fixed statements with bind parameters. They bypass
//! generation and validation but run through the same [`QueryExecutor`] in
//! read-only mode, so they get the same transaction handling.

use crate::error::MedSqlError;
use crate::executor::QueryExecutor;
use crate::models::{BindValue, ExecutionOutcome, QueryMode};
use chrono::{Days, NaiveDate};
use std::collections::BTreeMap;

const DAILY_APPOINTMENTS: &str = "\
SELECT name, date, time, service_type, phonenumber
FROM patient_app_appointment
WHERE date = $1::date
  AND doctor_id_id IN (
    SELECT id FROM user_app_user
    WHERE first_name ILIKE $2::text OR user_name ILIKE $2::text
  )
ORDER BY time";

const REVENUE_BY_SERVICE: &str = "\
SELECT a.service_type, SUM(b.bill_price) AS total_revenue
FROM patient_app_billreports b
JOIN patient_app_appointment a ON a.patient_id_id = b.patient_id_id
GROUP BY a.service_type
ORDER BY total_revenue DESC";

const FOLLOW_UP_REQUIRED: &str = "\
SELECT p.id, p.first_name, p.last_name, pr.name AS procedure_name
FROM patient_app_patient_details p
JOIN inpatient_app_inpatient i ON p.id = i.patient_id
JOIN inpatient_app_procedure pr ON i.procedure_id = pr.id
WHERE pr.name IN ('IUI', 'IVF', 'OI')
  AND (i.status IS NULL OR i.status != 'success')";

const PROCEDURES_BY_MONTH: &str = "\
SELECT p.first_name, p.last_name, pr.name AS procedure_name, i.admission_date
FROM patient_app_patient_details p
JOIN inpatient_app_inpatient i ON p.id = i.patient_id
JOIN inpatient_app_procedure pr ON i.procedure_id = pr.id
WHERE pr.name IN ('IUI', 'IVF', 'OI')
  AND TO_CHAR(i.admission_date, 'YYYY-MM') = $1::text";

const PROCEDURE_SUCCESS_RATE: &str = "\
SELECT pr.name AS procedure_name,
  ROUND(100 * COUNT(*) FILTER (WHERE i.status = 'success')::NUMERIC / NULLIF(COUNT(*), 0), 2)
    AS success_rate_percent
FROM inpatient_app_inpatient i
JOIN inpatient_app_procedure pr ON i.procedure_id = pr.id
WHERE pr.name IN ('IUI', 'IVF', 'OI')
GROUP BY pr.name";

const PATIENT_REGISTRATIONS: &str = "\
SELECT TO_CHAR(created_date, 'YYYY-MM') AS month, COUNT(*) AS registrations
FROM patient_app_patient_details
GROUP BY month
ORDER BY month";

const GEOGRAPHIC_DISTRIBUTION: &str = "\
SELECT city, district, locality_name, COUNT(*) AS patient_count
FROM patient_app_patient_details
GROUP BY city, district, locality_name
ORDER BY patient_count DESC";

const REFERRAL_SOURCES: &str = "\
SELECT referred_by, COUNT(*) AS patient_count
FROM patient_app_patient_details
GROUP BY referred_by
ORDER BY patient_count DESC";

const EXPIRING_MEDICINES: &str = "\
SELECT name, expiry_date, quantity
FROM inventory_app_druginventory
WHERE expiry_date <= $1::date
ORDER BY expiry_date";

const LOW_STOCK_MEDICINES: &str = "\
SELECT name, quantity
FROM inventory_app_druginventory
WHERE quantity < $1::int8
ORDER BY quantity";

const DEFAULT_EXPIRY_DAYS: u64 = 30;
const DEFAULT_STOCK_THRESHOLD: i64 = 10;

/// The predefined reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReportKind {
    DailyAppointments,
    RevenueByService,
    FollowUpRequired,
    ProceduresByMonth,
    ProcedureSuccessRate,
    PatientRegistrations,
    GeographicDistribution,
    ReferralSources,
    ExpiringMedicines,
    LowStockMedicines,
}

impl ReportKind {
    pub fn all() -> &'static [Self] {
        &[
            Self::DailyAppointments,
            Self::RevenueByService,
            Self::FollowUpRequired,
            Self::ProceduresByMonth,
            Self::ProcedureSuccessRate,
            Self::PatientRegistrations,
            Self::GeographicDistribution,
            Self::ReferralSources,
            Self::ExpiringMedicines,
            Self::LowStockMedicines,
        ]
    }

    /// URL-safe report name.
    pub fn name(self) -> &'static str {
        match self {
            Self::DailyAppointments => "daily-appointments",
            Self::RevenueByService => "revenue-by-service",
            Self::FollowUpRequired => "follow-up-required",
            Self::ProceduresByMonth => "procedures-by-month",
            Self::ProcedureSuccessRate => "procedure-success-rate",
            Self::PatientRegistrations => "patient-registrations",
            Self::GeographicDistribution => "geographic-distribution",
            Self::ReferralSources => "referral-sources",
            Self::ExpiringMedicines => "expiring-medicines",
            Self::LowStockMedicines => "low-stock-medicines",
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            Self::DailyAppointments => {
                "Appointments on a date (default today) for doctors matching `doctor`"
            }
            Self::RevenueByService => "Total billed revenue per appointment service type",
            Self::FollowUpRequired => "IUI, IVF and OI inpatients without a successful outcome",
            Self::ProceduresByMonth => "IUI, IVF and OI procedures admitted in `month` (YYYY-MM)",
            Self::ProcedureSuccessRate => "Success percentage per fertility procedure",
            Self::PatientRegistrations => "New patient registrations per month",
            Self::GeographicDistribution => "Patient counts per city, district and locality",
            Self::ReferralSources => "Patient counts per referrer",
            Self::ExpiringMedicines => "Medicines expiring within `days` days (default 30)",
            Self::LowStockMedicines => "Medicines with quantity below `threshold` (default 10)",
        }
    }

    /// Parameter names the report reads.
    pub fn parameters(self) -> &'static [&'static str] {
        match self {
            Self::DailyAppointments => &["doctor", "date"],
            Self::ProceduresByMonth => &["month"],
            Self::ExpiringMedicines => &["days"],
            Self::LowStockMedicines => &["threshold"],
            _ => &[],
        }
    }

    /// Resolves the statement and its bind values.
    ///
    /// `today` anchors the date defaults.
    ///
    /// # Errors
    /// Returns a configuration error for a missing or malformed parameter.
    pub fn statement(
        self,
        params: &ReportParams,
        today: NaiveDate,
    ) -> crate::Result<(&'static str, Vec<BindValue>)> {
        let statement = match self {
            Self::DailyAppointments => {
                let date = match params.get("date") {
                    Some(raw) => parse_date(raw)?,
                    None => today,
                };
                let doctor = params.get("doctor").unwrap_or_default();
                (
                    DAILY_APPOINTMENTS,
                    vec![
                        BindValue::Date(date),
                        BindValue::Text(format!("%{}%", doctor)),
                    ],
                )
            }
            Self::RevenueByService => (REVENUE_BY_SERVICE, Vec::new()),
            Self::FollowUpRequired => (FOLLOW_UP_REQUIRED, Vec::new()),
            Self::ProceduresByMonth => {
                let month = params
                    .get("month")
                    .ok_or_else(|| MedSqlError::configuration("Month parameter is required"))?;
                (
                    PROCEDURES_BY_MONTH,
                    vec![BindValue::Text(parse_month(month)?)],
                )
            }
            Self::ProcedureSuccessRate => (PROCEDURE_SUCCESS_RATE, Vec::new()),
            Self::PatientRegistrations => (PATIENT_REGISTRATIONS, Vec::new()),
            Self::GeographicDistribution => (GEOGRAPHIC_DISTRIBUTION, Vec::new()),
            Self::ReferralSources => (REFERRAL_SOURCES, Vec::new()),
            Self::ExpiringMedicines => {
                let days = match params.get("days") {
                    Some(raw) => raw.trim().parse::<u64>().map_err(|_| {
                        MedSqlError::configuration(format!(
                            "days must be a non-negative integer, got '{}'",
                            raw
                        ))
                    })?,
                    None => DEFAULT_EXPIRY_DAYS,
                };
                let target = today.checked_add_days(Days::new(days)).ok_or_else(|| {
                    MedSqlError::configuration(format!("days value {} is out of range", days))
                })?;
                (EXPIRING_MEDICINES, vec![BindValue::Date(target)])
            }
            Self::LowStockMedicines => {
                let threshold = match params.get("threshold") {
                    Some(raw) => raw.trim().parse::<i64>().map_err(|_| {
                        MedSqlError::configuration(format!(
                            "threshold must be an integer, got '{}'",
                            raw
                        ))
                    })?,
                    None => DEFAULT_STOCK_THRESHOLD,
                };
                (LOW_STOCK_MEDICINES, vec![BindValue::Int(threshold)])
            }
        };
        Ok(statement)
    }

    /// Runs the report read-only.
    ///
    /// # Errors
    /// Parameter errors are returned before anything is executed;
    /// execution failures are reported in the outcome.
    pub async fn run(
        self,
        executor: &QueryExecutor,
        params: &ReportParams,
        today: NaiveDate,
    ) -> crate::Result<ExecutionOutcome> {
        let (sql, args) = self.statement(params, today)?;
        tracing::debug!("Running report {}", self.name());
        Ok(executor.execute_bound(sql, &args, QueryMode::ReadOnly).await)
    }
}

impl std::fmt::Display for ReportKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

impl std::str::FromStr for ReportKind {
    type Err = MedSqlError;

    fn from_str(s: &str) -> crate::Result<Self> {
        let wanted = s.trim().to_ascii_lowercase().replace('_', "-");
        Self::all()
            .iter()
            .copied()
            .find(|kind| kind.name() == wanted)
            .ok_or_else(|| MedSqlError::configuration(format!("Unknown report '{}'", s.trim())))
    }
}

/// Named report parameters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportParams {
    values: BTreeMap<String, String>,
}

impl ReportParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(name.into(), value.into());
        self
    }

    /// Non-empty value for `name`.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.values
            .get(name)
            .map(String::as_str)
            .filter(|value| !value.trim().is_empty())
    }

    /// Parses a `name=value` pair as given on the command line.
    ///
    /// # Errors
    /// Returns a configuration error when `=` or the name is missing.
    pub fn parse_pair(pair: &str) -> crate::Result<(String, String)> {
        let (name, value) = pair.split_once('=').ok_or_else(|| {
            MedSqlError::configuration(format!("Report parameter '{}' must be name=value", pair))
        })?;
        let name = name.trim();
        if name.is_empty() {
            return Err(MedSqlError::configuration(format!(
                "Report parameter '{}' has no name",
                pair
            )));
        }
        Ok((name.to_string(), value.to_string()))
    }
}

impl FromIterator<(String, String)> for ReportParams {
    fn from_iter<I: IntoIterator<Item = (String, String)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}

fn parse_date(raw: &str) -> crate::Result<NaiveDate> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d").map_err(|_| {
        MedSqlError::configuration(format!("date must be YYYY-MM-DD, got '{}'", raw))
    })
}

fn parse_month(raw: &str) -> crate::Result<String> {
    let month = raw.trim();
    NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
        .map(|_| month.to_string())
        .map_err(|_| MedSqlError::configuration(format!("month must be YYYY-MM, got '{}'", raw)))
}
