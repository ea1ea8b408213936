//! Transport-neutral request/response contracts
//!
//! A transport adapter deserializes an [`ApiRequest`] (tagged by `op`),
//! passes it to [`dispatch`] together with the bearer credential it
//! received, and writes back the [`ApiResponse`] status and JSON body.

use crate::auth::Identity;
use crate::error::{Result, ServiceError};
use crate::service::BankingService;
use chrono::{DateTime, Utc};
use ledger_core::{Account, SystemSettings, TransactionFilter, MAX_LIST_LIMIT};
use rust_decimal::Decimal;
use security::Role;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use uuid::Uuid;

/// Default manual lock length for `admin_lock_user`
pub const DEFAULT_LOCK_MINUTES: u32 = 1440;

/// Every operation the service exposes
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum ApiRequest {
    Health,
    CreateAccount {
        username: String,
        password: String,
    },
    Authenticate(LoginRequest),
    AuthenticateAdmin(LoginRequest),
    BeginTwoFactor,
    ConfirmTwoFactor {
        secret: String,
        code: String,
    },
    DisableTwoFactor {
        code: String,
    },
    TwoFactorStatus,
    Balance,
    Me,
    Deposit {
        amount: Decimal,
    },
    Withdraw {
        amount: Decimal,
    },
    Transfer {
        to_account_number: String,
        amount: Decimal,
    },
    ListTransactions {
        #[serde(default)]
        limit: Option<usize>,
    },
    AccountByNumber {
        account_number: String,
    },
    ChangePassword {
        current_password: String,
        new_password: String,
    },

    AdminDashboard,
    AdminListUsers {
        #[serde(default)]
        page: u32,
        #[serde(default)]
        page_size: Option<u32>,
    },
    AdminUserDetail {
        username: String,
    },
    AdminLockUser {
        username: String,
        #[serde(default = "default_lock_minutes")]
        minutes: u32,
    },
    AdminUnlockUser {
        username: String,
    },
    AdminResetPassword {
        username: String,
    },
    AdminListTransactions {
        #[serde(default)]
        filter: Option<String>,
        #[serde(default)]
        threshold: Option<Decimal>,
        #[serde(default)]
        page: u32,
        #[serde(default)]
        page_size: Option<u32>,
    },
    AdminFlagTransaction {
        id: Uuid,
        flagged: bool,
    },
    AdminSecurityLog {
        #[serde(default)]
        page: u32,
        #[serde(default)]
        page_size: Option<u32>,
    },
    AdminVerifySecurityLog,
    AdminSettings,
    AdminUpdateSettings(SystemSettings),
    AdminPurgeLogs {
        #[serde(default)]
        days: Option<u32>,
    },
    AdminCreateAdmin {
        username: String,
        password: String,
    },
    AdminResetTestData,
}

fn default_lock_minutes() -> u32 {
    DEFAULT_LOCK_MINUTES
}

/// Credentials for either login flow
#[derive(Debug, Clone, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
    #[serde(default)]
    pub otp: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

/// Account as shown to its owner (no credential material)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccountView {
    pub username: String,
    pub account_number: String,
    pub balance: Decimal,
    pub role: Role,
    pub created_at: DateTime<Utc>,
    pub last_login: Option<DateTime<Utc>>,
    pub two_factor_enabled: bool,
}

impl From<&Account> for AccountView {
    fn from(account: &Account) -> Self {
        Self {
            username: account.username.clone(),
            account_number: account.account_number.clone(),
            balance: account.balance,
            role: account.role,
            created_at: account.created_at,
            last_login: account.last_login,
            two_factor_enabled: account.two_factor_enabled(),
        }
    }
}

/// Error payload
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub locked_until: Option<DateTime<Utc>>,
}

impl From<&ServiceError> for ErrorBody {
    fn from(err: &ServiceError) -> Self {
        let locked_until = match err {
            ServiceError::AccountLocked { until } => Some(*until),
            _ => None,
        };

        // Internal details stay in the log
        let message = if err.status_code() >= 500 {
            "internal error".to_string()
        } else {
            err.to_string()
        };

        Self {
            error: err.error_type(),
            message,
            locked_until,
        }
    }
}

/// Status plus JSON body
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: Value,
}

impl ApiResponse {
    fn ok<T: Serialize>(value: &T) -> Result<Self> {
        Self::with_status(200, value)
    }

    fn with_status<T: Serialize>(status: u16, value: &T) -> Result<Self> {
        let body =
            serde_json::to_value(value).map_err(|e| ServiceError::InternalStorage(e.to_string()))?;
        Ok(Self { status, body })
    }

    fn error(err: &ServiceError) -> Self {
        if err.status_code() >= 500 {
            tracing::error!(error = %err, "Request failed");
        }

        let body = serde_json::to_value(ErrorBody::from(err))
            .unwrap_or_else(|_| json!({ "error": err.error_type() }));
        Self {
            status: err.status_code(),
            body,
        }
    }

    /// 2xx
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Run one request; errors become error bodies
pub async fn dispatch(
    service: &BankingService,
    bearer: Option<&str>,
    request: ApiRequest,
) -> ApiResponse {
    match handle(service, bearer, request).await {
        Ok(response) => response,
        Err(err) => ApiResponse::error(&err),
    }
}

async fn handle(
    service: &BankingService,
    bearer: Option<&str>,
    request: ApiRequest,
) -> Result<ApiResponse> {
    use ApiRequest as R;

    match request {
        R::Health => {
            service.health()?;
            ApiResponse::ok(&json!({ "status": "healthy", "service": "banking-service" }))
        }
        R::CreateAccount { username, password } => {
            let account = service.create_account(&username, &password).await?;
            ApiResponse::with_status(201, &AccountView::from(&account))
        }
        R::Authenticate(login) => {
            let token = service
                .authenticate(
                    &login.username,
                    &login.password,
                    login.otp.as_deref(),
                    login.source.as_deref(),
                )
                .await?;
            ApiResponse::ok(&token)
        }
        R::AuthenticateAdmin(login) => {
            let token = service
                .authenticate_admin(
                    &login.username,
                    &login.password,
                    login.otp.as_deref(),
                    login.source.as_deref(),
                )
                .await?;
            ApiResponse::ok(&token)
        }
        R::BeginTwoFactor => {
            let identity = user(service, bearer)?;
            ApiResponse::ok(&service.begin_enrollment(&identity)?)
        }
        R::ConfirmTwoFactor { secret, code } => {
            let identity = user(service, bearer)?;
            service.confirm_enrollment(&identity, &secret, &code).await?;
            ApiResponse::ok(&json!({ "enabled": true }))
        }
        R::DisableTwoFactor { code } => {
            let identity = user(service, bearer)?;
            service.disable_two_factor(&identity, &code).await?;
            ApiResponse::ok(&json!({ "enabled": false }))
        }
        R::TwoFactorStatus => {
            let identity = user(service, bearer)?;
            ApiResponse::ok(&json!({ "enabled": service.two_factor_status(&identity)? }))
        }
        R::Balance => {
            let identity = user(service, bearer)?;
            let account = service.me(&identity)?;
            ApiResponse::ok(&json!({
                "username": account.username,
                "account_number": account.account_number,
                "balance": account.balance,
            }))
        }
        R::Me => {
            let identity = user(service, bearer)?;
            ApiResponse::ok(&AccountView::from(&service.me(&identity)?))
        }
        R::Deposit { amount } => {
            let identity = user(service, bearer)?;
            ApiResponse::ok(&service.deposit(&identity, amount).await?)
        }
        R::Withdraw { amount } => {
            let identity = user(service, bearer)?;
            ApiResponse::ok(&service.withdraw(&identity, amount).await?)
        }
        R::Transfer {
            to_account_number,
            amount,
        } => {
            let identity = user(service, bearer)?;
            ApiResponse::ok(&service.transfer(&identity, &to_account_number, amount).await?)
        }
        R::ListTransactions { limit } => {
            let identity = user(service, bearer)?;
            let limit = limit.unwrap_or(MAX_LIST_LIMIT);
            ApiResponse::ok(&json!({
                "transactions": service.list_transactions(&identity, limit)?,
            }))
        }
        R::AccountByNumber { account_number } => {
            let identity = user(service, bearer)?;
            let entry = service.account_by_number(&identity, &account_number)?;
            ApiResponse::ok(&json!({
                "username": entry.username,
                "account_number": entry.account_number,
            }))
        }
        R::ChangePassword {
            current_password,
            new_password,
        } => {
            let identity = user(service, bearer)?;
            service
                .change_password(&identity, &current_password, &new_password)
                .await?;
            ApiResponse::ok(&json!({ "changed": true }))
        }

        R::AdminDashboard => {
            let admin = admin(service, bearer)?;
            ApiResponse::ok(&service.admin_dashboard(&admin)?)
        }
        R::AdminListUsers { page, page_size } => {
            let admin = admin(service, bearer)?;
            ApiResponse::ok(&service.admin_list_users(&admin, page, page_size)?)
        }
        R::AdminUserDetail { username } => {
            let admin = admin(service, bearer)?;
            ApiResponse::ok(&service.admin_user_detail(&admin, &username)?)
        }
        R::AdminLockUser { username, minutes } => {
            let admin = admin(service, bearer)?;
            let account = service.admin_lock_user(&admin, &username, minutes).await?;
            ApiResponse::ok(&json!({
                "username": account.username,
                "lock_until": account.lock_until,
            }))
        }
        R::AdminUnlockUser { username } => {
            let admin = admin(service, bearer)?;
            let account = service.admin_unlock_user(&admin, &username).await?;
            ApiResponse::ok(&json!({ "username": account.username, "lock_until": null }))
        }
        R::AdminResetPassword { username } => {
            let admin = admin(service, bearer)?;
            let temporary_password = service.admin_reset_password(&admin, &username).await?;
            ApiResponse::ok(&json!({
                "username": username,
                "temporary_password": temporary_password,
            }))
        }
        R::AdminListTransactions {
            filter,
            threshold,
            page,
            page_size,
        } => {
            let admin = admin(service, bearer)?;
            let filter = parse_filter(
                filter.as_deref(),
                threshold.unwrap_or(service.config().admin.large_amount_threshold),
            )?;
            ApiResponse::ok(&service.admin_list_transactions(&admin, filter, page, page_size)?)
        }
        R::AdminFlagTransaction { id, flagged } => {
            let admin = admin(service, bearer)?;
            ApiResponse::ok(&service.admin_flag_transaction(&admin, id, flagged).await?)
        }
        R::AdminSecurityLog { page, page_size } => {
            let admin = admin(service, bearer)?;
            ApiResponse::ok(&service.admin_security_log(&admin, page, page_size)?)
        }
        R::AdminVerifySecurityLog => {
            let admin = admin(service, bearer)?;
            let verified = service.admin_verify_security_log(&admin)?;
            ApiResponse::ok(&json!({ "intact": true, "entries_verified": verified }))
        }
        R::AdminSettings => {
            let admin = admin(service, bearer)?;
            ApiResponse::ok(&service.admin_settings(&admin)?)
        }
        R::AdminUpdateSettings(settings) => {
            let admin = admin(service, bearer)?;
            ApiResponse::ok(&service.admin_update_settings(&admin, settings)?)
        }
        R::AdminPurgeLogs { days } => {
            let admin = admin(service, bearer)?;
            ApiResponse::ok(&service.admin_purge_logs(&admin, days)?)
        }
        R::AdminCreateAdmin { username, password } => {
            let admin = admin(service, bearer)?;
            let account = service.admin_create_admin(&admin, &username, &password).await?;
            ApiResponse::with_status(201, &AccountView::from(&account))
        }
        R::AdminResetTestData => {
            let admin = admin(service, bearer)?;
            ApiResponse::ok(&service.admin_reset_test_data(&admin).await?)
        }
    }
}

/// Accepts a raw token or an `Authorization` header value
fn token(bearer: Option<&str>) -> Result<&str> {
    let raw = bearer.map(str::trim).unwrap_or_default();
    let token = raw
        .strip_prefix("Bearer ")
        .or_else(|| raw.strip_prefix("bearer "))
        .unwrap_or(raw)
        .trim();

    if token.is_empty() {
        return Err(ServiceError::AuthenticationFailure);
    }
    Ok(token)
}

fn user(service: &BankingService, bearer: Option<&str>) -> Result<Identity> {
    service.authorize(token(bearer)?)
}

fn admin(service: &BankingService, bearer: Option<&str>) -> Result<Identity> {
    service.authorize_admin(token(bearer)?)
}

fn parse_filter(filter: Option<&str>, threshold: Decimal) -> Result<TransactionFilter> {
    match filter.unwrap_or("all") {
        "all" => Ok(TransactionFilter::All),
        "today" => Ok(TransactionFilter::Today),
        "flagged" => Ok(TransactionFilter::Flagged),
        "large-amount" | "large_amount" | "large" => Ok(TransactionFilter::LargeAmount(threshold)),
        other => Err(ServiceError::Validation(format!("unknown filter: {}", other))),
    }
}
