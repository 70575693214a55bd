//! Page view-models: list state machines, the KYB decision gate and status badges.

use crate::envelope::{NormalizedList, Pagination};
use crate::errors::AppError;
use crate::models::{KybRecord, KybStatus, PricingTier, TopupStatusClass};
use crate::query_cache::QueryState;
use crate::session::Session;
use serde::Serialize;
use std::sync::Arc;

/// Where the console goes after a KYB decision.
pub const KYB_HISTORY_ROUTE: &str = "/admin/kyb/history";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageState {
    NoCredential,
    Loading,
    /// Reloading while the previous data stays on screen.
    Refreshing,
    Ready,
    Empty,
    Failed(String),
}

impl PageState {
    pub fn as_str(&self) -> &'static str {
        match self {
            PageState::NoCredential => "no_credential",
            PageState::Loading => "loading",
            PageState::Refreshing => "refreshing",
            PageState::Ready => "ready",
            PageState::Empty => "empty",
            PageState::Failed(_) => "failed",
        }
    }

    pub fn message(&self) -> Option<&str> {
        match self {
            PageState::Failed(message) => Some(message),
            _ => None,
        }
    }
}

/// Local state of one paginated list page.
#[derive(Debug, Clone)]
pub struct ListScreen<T> {
    state: PageState,
    has_api_key: bool,
    page: u32,
    per_page: u32,
    search: Option<String>,
    status: Option<String>,
    data: Option<Arc<NormalizedList<T>>>,
}

impl<T> ListScreen<T> {
    pub fn new(per_page: u32) -> Self {
        Self {
            state: PageState::NoCredential,
            has_api_key: false,
            page: 1,
            per_page: per_page.max(1),
            search: None,
            status: None,
            data: None,
        }
    }

    /// Reads the credential once. A key set later does not affect a mounted screen.
    pub fn mount(&mut self, session: &Session) {
        self.has_api_key = session.is_enabled();
        self.state = if self.has_api_key {
            PageState::Loading
        } else {
            PageState::NoCredential
        };
    }

    fn reload(&mut self) {
        if !self.has_api_key {
            self.state = PageState::NoCredential;
        } else if self.data.is_some() {
            self.state = PageState::Refreshing;
        } else {
            self.state = PageState::Loading;
        }
    }

    pub fn change_search(&mut self, search: &str) {
        let search = search.trim();
        self.search = (!search.is_empty()).then(|| search.to_string());
        self.page = 1;
        self.reload();
    }

    pub fn change_status(&mut self, status: Option<&str>) {
        self.status = status
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);
        self.page = 1;
        self.reload();
    }

    pub fn go_to_page(&mut self, page: u32) {
        self.page = page.max(1);
        self.reload();
    }

    pub fn next_page(&mut self) -> bool {
        if !self.can_next() {
            return false;
        }
        self.go_to_page(self.page + 1);
        true
    }

    pub fn prev_page(&mut self) -> bool {
        if !self.can_prev() {
            return false;
        }
        self.go_to_page(self.page - 1);
        true
    }

    pub fn begin_refresh(&mut self) {
        self.reload();
    }

    /// Applies a finished read.
    pub fn settle(&mut self, result: &QueryState<NormalizedList<T>>) {
        match result {
            QueryState::Disabled => {
                self.state = PageState::NoCredential;
            }
            QueryState::Success { data, .. } => {
                self.state = if data.is_empty() {
                    PageState::Empty
                } else {
                    PageState::Ready
                };
                self.data = Some(Arc::clone(data));
            }
            QueryState::Error(err) => {
                self.state = PageState::Failed(err.user_message());
            }
        }
    }

    pub fn can_next(&self) -> bool {
        self.pagination().map(Pagination::has_next).unwrap_or(false)
    }

    pub fn can_prev(&self) -> bool {
        self.page > 1
    }

    pub fn state(&self) -> &PageState {
        &self.state
    }

    pub fn page(&self) -> u32 {
        self.page
    }

    pub fn per_page(&self) -> u32 {
        self.per_page
    }

    pub fn search(&self) -> Option<&str> {
        self.search.as_deref()
    }

    pub fn status(&self) -> Option<&str> {
        self.status.as_deref()
    }

    pub fn data(&self) -> Option<&NormalizedList<T>> {
        self.data.as_deref()
    }

    pub fn pagination(&self) -> Option<&Pagination> {
        self.data.as_ref().and_then(|list| list.pagination.as_ref())
    }
}

/// Preconditions for submitting an approve or reject decision.
#[derive(Debug, Clone, Default)]
pub struct KybDecisionGate {
    pub has_api_key: bool,
    pub selected_id: Option<String>,
    pub details_loaded: bool,
    pub pending: bool,
}

impl KybDecisionGate {
    pub fn for_details(session: &Session, selected_id: &str, details: &QueryState<KybRecord>) -> Self {
        let selected_id = selected_id.trim();
        Self {
            has_api_key: session.is_enabled(),
            selected_id: (!selected_id.is_empty()).then(|| selected_id.to_string()),
            details_loaded: details.is_success(),
            pending: false,
        }
    }

    pub fn check_approve(&self) -> Result<(), AppError> {
        if !self.has_api_key {
            return Err(AppError::Validation("Please set your API key first".to_string()));
        }
        if self.selected_id.is_none() {
            return Err(AppError::Validation("Please select a KYB request first".to_string()));
        }
        if !self.details_loaded {
            return Err(AppError::Validation(
                "KYB details must be loaded before a decision".to_string(),
            ));
        }
        if self.pending {
            return Err(AppError::Validation(
                "A decision for this request is already in progress".to_string(),
            ));
        }
        Ok(())
    }

    pub fn check_reject(&self, reason: &str) -> Result<(), AppError> {
        self.check_approve()?;
        if reason.trim().is_empty() {
            return Err(AppError::Validation(
                "Please provide a reason for rejection".to_string(),
            ));
        }
        Ok(())
    }
}

/// Raises a failed gate as an alert.
pub fn enforce(check: Result<(), AppError>, session: &Session) -> Result<(), AppError> {
    if let Err(e) = &check {
        session.alerts().error(&e.user_message());
    }
    check
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BadgeTone {
    Success,
    Warning,
    Danger,
    Info,
    Neutral,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Badge {
    pub label: String,
    pub tone: BadgeTone,
}

fn title_case(raw: &str) -> String {
    let lower = raw.trim().to_lowercase();
    let mut chars = lower.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => "Unknown".to_string(),
    }
}

pub fn kyb_badge(status: &KybStatus) -> Badge {
    let (label, tone) = match status {
        KybStatus::Pending => ("Pending".to_string(), BadgeTone::Warning),
        KybStatus::Approved => ("Approved".to_string(), BadgeTone::Success),
        KybStatus::Rejected => ("Rejected".to_string(), BadgeTone::Danger),
        KybStatus::Legacy => ("Legacy".to_string(), BadgeTone::Info),
        KybStatus::Other(raw) => (title_case(raw), BadgeTone::Neutral),
    };
    Badge { label, tone }
}

pub fn topup_badge(status: &str) -> Badge {
    let tone = match TopupStatusClass::classify(status) {
        TopupStatusClass::Done => BadgeTone::Success,
        TopupStatusClass::Pending => BadgeTone::Warning,
        TopupStatusClass::Failed => BadgeTone::Danger,
        TopupStatusClass::Other => BadgeTone::Neutral,
    };
    Badge {
        label: title_case(status),
        tone,
    }
}

/// Display order for the tier table: `tier_order`, then lower volume bound.
pub fn sort_tiers(tiers: &mut [PricingTier]) {
    tiers.sort_by_key(|tier| (tier.tier_order.unwrap_or(i64::MAX), tier.volume_min));
}
