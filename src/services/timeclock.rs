//! Employee time clock and payroll export

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};
use sea_orm::{ActiveModelTrait, ActiveValue::Set, ColumnTrait, EntityTrait, QueryFilter, QueryOrder};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::config::{RoundingMode, get_config};
use crate::errors::{FieldErrorsBuilder, NestogyError, Result};
use crate::models::{ClockStatus, parse_field};
use crate::services::TenantContext;
use crate::storage::{PageRequest, Paginated, SeaOrmStorage, TenantScoped, find_scoped, paginate};
use crate::utils::csv_handler::write_rows;
use migration::entities::{employee_time_entry, user};

/// 实际工作分钟数：整分钟差减去休息时间，最小为 0
pub fn worked_minutes(
    clock_in: DateTime<Utc>,
    clock_out: DateTime<Utc>,
    break_minutes: i32,
) -> Result<i32> {
    if clock_out < clock_in {
        return Err(NestogyError::invalid_field(
            "clock_out",
            "must be a time after clock_in",
        ));
    }
    let elapsed = (clock_out - clock_in).num_minutes();
    let worked = elapsed - i64::from(break_minutes.max(0));
    Ok(worked.clamp(0, i64::from(i32::MAX)) as i32)
}

/// 按薪资规则取整；increment 为 0 或 1 时不取整
pub fn round_minutes(minutes: i32, increment: u32, mode: RoundingMode) -> i32 {
    if increment <= 1 || minutes <= 0 {
        return minutes.max(0);
    }
    let inc = increment as i32;
    let rem = minutes % inc;
    if rem == 0 {
        return minutes;
    }
    let down = minutes - rem;
    match mode {
        RoundingMode::Down => down,
        RoundingMode::Up => down + inc,
        // 恰好一半时向上
        RoundingMode::Nearest => {
            if rem * 2 >= inc {
                down + inc
            } else {
                down
            }
        }
    }
}

fn payroll_minutes(clock_in: DateTime<Utc>, clock_out: DateTime<Utc>, break_minutes: i32) -> Result<i32> {
    let payroll = get_config().payroll.clone();
    let worked = worked_minutes(clock_in, clock_out, break_minutes)?;
    Ok(round_minutes(worked, payroll.rounding_increment_minutes, payroll.rounding_mode))
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClockInput {
    pub break_minutes: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClockEntryUpdate {
    pub clock_in: Option<DateTime<Utc>>,
    pub clock_out: Option<DateTime<Utc>>,
    pub break_minutes: Option<i32>,
    pub notes: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ClockFilter {
    pub user_id: Option<i32>,
    pub status: Option<String>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

/// 薪资导出行（每个员工一行）
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct PayrollRow {
    pub user_id: i32,
    pub name: String,
    pub email: String,
    pub entries: usize,
    pub total_minutes: i64,
    /// 小时数，两位小数
    pub total_hours: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PayrollExport {
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub entry_count: usize,
    pub rows: Vec<PayrollRow>,
    pub csv: String,
}

fn format_hours(minutes: i64) -> String {
    format!("{}.{:02}", minutes / 60, (minutes % 60) * 100 / 60)
}

fn day_start(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}

/// 次日零点，作为按日期过滤时的开区间上界
fn day_after(date: NaiveDate) -> DateTime<Utc> {
    date.succ_opt().map(day_start).unwrap_or(DateTime::<Utc>::MAX_UTC)
}

pub struct TimeClockService {
    storage: Arc<SeaOrmStorage>,
}

impl TimeClockService {
    pub fn new(storage: Arc<SeaOrmStorage>) -> Self {
        Self { storage }
    }

    /// 普通员工只能看到自己的记录
    pub async fn list(
        &self,
        ctx: &TenantContext,
        filter: &ClockFilter,
        page: &PageRequest,
    ) -> Result<Paginated<employee_time_entry::Model>> {
        let mut select = employee_time_entry::Entity::find_in_tenant(ctx.company_id);
        let user_filter = if ctx.require_billing().is_ok() {
            filter.user_id
        } else {
            Some(ctx.user_id)
        };
        if let Some(user_id) = user_filter {
            select = select.filter(employee_time_entry::Column::UserId.eq(user_id));
        }
        if let Some(s) = filter.status.as_deref().filter(|s| !s.is_empty()) {
            let s = parse_field::<ClockStatus>("status", s)?;
            select = select.filter(employee_time_entry::Column::Status.eq(s.as_ref()));
        }
        if let Some(from) = filter.from {
            select = select.filter(employee_time_entry::Column::ClockIn.gte(day_start(from)));
        }
        if let Some(to) = filter.to {
            select = select.filter(employee_time_entry::Column::ClockIn.lt(day_after(to)));
        }
        let select = select.order_by_desc(employee_time_entry::Column::ClockIn);
        paginate(self.storage.get_db(), select, page).await
    }

    pub async fn get(&self, ctx: &TenantContext, id: i32) -> Result<employee_time_entry::Model> {
        let entry = find_scoped::<employee_time_entry::Entity, _>(self.storage.get_db(), ctx.company_id, id).await?;
        if entry.user_id != ctx.user_id && ctx.require_billing().is_err() {
            return Err(NestogyError::not_found(format!("Time clock entry {} not found", id)));
        }
        Ok(entry)
    }

    async fn open_entry(&self, ctx: &TenantContext) -> Result<Option<employee_time_entry::Model>> {
        Ok(employee_time_entry::Entity::find_in_tenant(ctx.company_id)
            .filter(employee_time_entry::Column::UserId.eq(ctx.user_id))
            .filter(employee_time_entry::Column::Status.eq(ClockStatus::InProgress.as_ref()))
            .one(self.storage.get_db())
            .await?)
    }

    pub async fn clock_in(&self, ctx: &TenantContext, input: ClockInput) -> Result<employee_time_entry::Model> {
        if self.open_entry(ctx).await?.is_some() {
            return Err(NestogyError::invalid_field(
                "clock_in",
                "you are already clocked in",
            ));
        }

        let now = Utc::now();
        let created = employee_time_entry::ActiveModel {
            company_id: Set(ctx.company_id),
            user_id: Set(ctx.user_id),
            clock_in: Set(now),
            clock_out: Set(None),
            break_minutes: Set(0),
            total_minutes: Set(None),
            status: Set(ClockStatus::InProgress.to_string()),
            exported_to_payroll_at: Set(None),
            approved_by: Set(None),
            notes: Set(crate::utils::non_empty(input.notes)),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(self.storage.get_db())
        .await?;

        info!("TimeClockService: user {} clocked in (entry {})", ctx.user_id, created.id);
        Ok(created)
    }

    pub async fn clock_out(&self, ctx: &TenantContext, input: ClockInput) -> Result<employee_time_entry::Model> {
        let Some(entry) = self.open_entry(ctx).await? else {
            return Err(NestogyError::invalid_field("clock_out", "you are not clocked in"));
        };
        let break_minutes = input.break_minutes.unwrap_or(entry.break_minutes);
        if break_minutes < 0 {
            return Err(NestogyError::invalid_field("break_minutes", "must be at least 0"));
        }

        let now = Utc::now();
        let total = payroll_minutes(entry.clock_in, now, break_minutes)?;
        let mut model: employee_time_entry::ActiveModel = entry.into();
        model.clock_out = Set(Some(now));
        model.break_minutes = Set(break_minutes);
        model.total_minutes = Set(Some(total));
        model.status = Set(ClockStatus::Completed.to_string());
        if let Some(notes) = input.notes {
            model.notes = Set(crate::utils::non_empty(Some(notes)));
        }
        model.updated_at = Set(now);
        let updated = model.update(self.storage.get_db()).await?;

        info!(
            "TimeClockService: user {} clocked out ({} minutes)",
            ctx.user_id, total
        );
        Ok(updated)
    }

    /// 修改打卡记录并重新计算时长；已导出薪资的记录不可修改
    pub async fn update(
        &self,
        ctx: &TenantContext,
        id: i32,
        input: ClockEntryUpdate,
    ) -> Result<employee_time_entry::Model> {
        let entry = self.get(ctx, id).await?;
        if entry.exported_to_payroll_at.is_some() {
            return Err(NestogyError::validation(
                "This entry has been exported to payroll and can no longer be edited",
            ));
        }
        let is_manager = ctx.require_billing().is_ok();
        if !is_manager && entry.status == ClockStatus::Approved.as_ref() {
            return Err(NestogyError::validation("Approved entries can only be edited by a manager"));
        }

        let mut errors = FieldErrorsBuilder::new();
        let clock_in = input.clock_in.unwrap_or(entry.clock_in);
        let clock_out = input.clock_out.or(entry.clock_out);
        let break_minutes = input.break_minutes.unwrap_or(entry.break_minutes);
        if break_minutes < 0 {
            errors.add("break_minutes", "must be at least 0");
        }
        let total = match clock_out {
            Some(out) => errors.capture("clock_out", payroll_minutes(clock_in, out, break_minutes)),
            None => None,
        };
        errors.finish()?;

        let status = match (entry.status.as_str(), clock_out) {
            (s, Some(_)) if s == ClockStatus::InProgress.as_ref() => ClockStatus::Completed.to_string(),
            (s, _) => s.to_string(),
        };

        let mut model: employee_time_entry::ActiveModel = entry.into();
        model.clock_in = Set(clock_in);
        model.clock_out = Set(clock_out);
        model.break_minutes = Set(break_minutes);
        model.total_minutes = Set(total);
        model.status = Set(status);
        if let Some(notes) = input.notes {
            model.notes = Set(crate::utils::non_empty(Some(notes)));
        }
        model.updated_at = Set(Utc::now());
        Ok(model.update(self.storage.get_db()).await?)
    }

    pub async fn approve(&self, ctx: &TenantContext, id: i32) -> Result<employee_time_entry::Model> {
        self.review(ctx, id, ClockStatus::Approved).await
    }

    pub async fn reject(&self, ctx: &TenantContext, id: i32) -> Result<employee_time_entry::Model> {
        self.review(ctx, id, ClockStatus::Rejected).await
    }

    async fn review(
        &self,
        ctx: &TenantContext,
        id: i32,
        next: ClockStatus,
    ) -> Result<employee_time_entry::Model> {
        ctx.require_billing()?;
        let entry = find_scoped::<employee_time_entry::Entity, _>(self.storage.get_db(), ctx.company_id, id).await?;
        if entry.exported_to_payroll_at.is_some() {
            return Err(NestogyError::validation(
                "This entry has been exported to payroll and can no longer be reviewed",
            ));
        }
        let current = parse_field::<ClockStatus>("status", &entry.status)?;
        if current == ClockStatus::InProgress {
            return Err(NestogyError::validation("Entries still in progress cannot be reviewed"));
        }

        let mut model: employee_time_entry::ActiveModel = entry.into();
        model.status = Set(next.to_string());
        model.approved_by = Set((next == ClockStatus::Approved).then_some(ctx.user_id));
        model.updated_at = Set(Utc::now());
        let updated = model.update(self.storage.get_db()).await?;

        info!("TimeClockService: entry {} {} by {}", id, next, ctx.user_id);
        Ok(updated)
    }

    /// 导出 [from, to] 内已审批、未导出的记录，并在同一事务中标记为已导出
    pub async fn export_payroll(&self, ctx: &TenantContext, from: NaiveDate, to: NaiveDate) -> Result<PayrollExport> {
        ctx.require_billing()?;
        if to < from {
            return Err(NestogyError::invalid_field("to", "must be a date after or equal to from"));
        }

        let txn = self.storage.begin().await?;
        let entries = employee_time_entry::Entity::find_in_tenant(ctx.company_id)
            .filter(employee_time_entry::Column::Status.eq(ClockStatus::Approved.as_ref()))
            .filter(employee_time_entry::Column::ExportedToPayrollAt.is_null())
            .filter(employee_time_entry::Column::ClockIn.gte(day_start(from)))
            .filter(employee_time_entry::Column::ClockIn.lt(day_after(to)))
            .order_by_asc(employee_time_entry::Column::Id)
            .all(&txn)
            .await?;
        let users = user::Entity::find_in_tenant(ctx.company_id).all(&txn).await?;

        let mut totals: BTreeMap<i32, (usize, i64)> = BTreeMap::new();
        let now = Utc::now();
        let entry_count = entries.len();
        for entry in entries {
            let slot = totals.entry(entry.user_id).or_default();
            slot.0 += 1;
            slot.1 += i64::from(entry.total_minutes.unwrap_or(0));

            let mut model: employee_time_entry::ActiveModel = entry.into();
            model.exported_to_payroll_at = Set(Some(now));
            model.updated_at = Set(now);
            model.update(&txn).await?;
        }
        txn.commit().await?;

        let rows: Vec<PayrollRow> = totals
            .into_iter()
            .map(|(user_id, (entries, minutes))| {
                let person = users.iter().find(|u| u.id == user_id);
                PayrollRow {
                    user_id,
                    name: person.map(|u| u.name.clone()).unwrap_or_default(),
                    email: person.map(|u| u.email.clone()).unwrap_or_default(),
                    entries,
                    total_minutes: minutes,
                    total_hours: format_hours(minutes),
                }
            })
            .collect();
        let csv = write_rows(&rows)?;

        info!(
            "TimeClockService: exported {} entries for {} users ({} to {})",
            entry_count,
            rows.len(),
            from,
            to
        );
        Ok(PayrollExport {
            from,
            to,
            entry_count,
            rows,
            csv,
        })
    }
}
