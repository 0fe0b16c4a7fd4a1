//! Order list filtering and pagination.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::order::{Order, OrderStatus, OrderView};
use crate::store::Store;

pub const DEFAULT_PER_PAGE: usize = 10;
pub const MAX_PER_PAGE: usize = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DateFilter {
    Today,
    Week,
    Month,
    #[default]
    All,
}

impl DateFilter {
    fn admits(&self, created_at: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        match self {
            DateFilter::Today => created_at.date_naive() == now.date_naive(),
            DateFilter::Week => created_at >= now - Duration::days(7),
            DateFilter::Month => created_at >= now - Duration::days(30),
            DateFilter::All => true,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OrderQuery {
    pub branch_id: Option<Uuid>,
    pub status: Option<OrderStatus>,
    /// Case-insensitive match on id, code, customer name or phone.
    pub search: Option<String>,
    pub date_filter: Option<DateFilter>,
    pub page: Option<usize>,
    pub per_page: Option<usize>,
}

impl OrderQuery {
    fn per_page(&self) -> usize {
        self.per_page
            .unwrap_or(DEFAULT_PER_PAGE)
            .clamp(1, MAX_PER_PAGE)
    }

    fn page(&self) -> usize {
        self.page.unwrap_or(1).max(1)
    }

    fn matches(&self, order: &Order, needle: Option<&str>, now: DateTime<Utc>) -> bool {
        if self.branch_id.is_some_and(|id| order.branch_id != Some(id)) {
            return false;
        }
        if self.status.is_some_and(|status| order.status != status) {
            return false;
        }
        if !self
            .date_filter
            .unwrap_or_default()
            .admits(order.created_at, now)
        {
            return false;
        }
        let Some(needle) = needle else {
            return true;
        };

        let contains = |value: &str| value.to_lowercase().contains(needle);
        contains(order.id.to_string().as_str())
            || [&order.code, &order.customer_name, &order.customer_phone]
                .into_iter()
                .flatten()
                .any(|value| contains(value.as_str()))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub current_page: usize,
    pub per_page: usize,
    pub total: usize,
    pub last_page: usize,
}

impl Store {
    /// Orders matching `query`, newest first, cut to the requested page.
    pub fn search_orders(&self, query: &OrderQuery, now: DateTime<Utc>) -> Page<OrderView> {
        let needle = query
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_lowercase);

        let mut orders: Vec<Order> = self
            .orders
            .iter()
            .filter(|entry| query.matches(entry.value(), needle.as_deref(), now))
            .map(|entry| entry.value().clone())
            .collect();
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));

        let per_page = query.per_page();
        let current_page = query.page();
        let total = orders.len();

        let data = orders
            .into_iter()
            .skip((current_page - 1).saturating_mul(per_page))
            .take(per_page)
            .map(|order| {
                let rider = order
                    .assigned_rider_id
                    .and_then(|id| self.rider(id).ok());
                OrderView { order, rider }
            })
            .collect();

        Page {
            data,
            current_page,
            per_page,
            total,
            last_page: total.div_ceil(per_page).max(1),
        }
    }
}
