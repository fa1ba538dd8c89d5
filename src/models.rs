//! 领域枚举
//!
//! 数据库中统一存储为小写字符串（`AsRef<str>` 的结果），
//! 读取时通过 `FromStr` 解析。

use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize};
use strum::{AsRefStr, Display, EnumIter, EnumString, IntoEnumIterator};

use crate::errors::{NestogyError, Result};

/// 解析字段值，失败时返回带可选值列表的字段错误
pub fn parse_field<T>(field: &str, value: &str) -> Result<T>
where
    T: FromStr + IntoEnumIterator + AsRef<str>,
{
    value.trim().parse::<T>().map_err(|_| {
        let allowed: Vec<String> = T::iter().map(|v| v.as_ref().to_string()).collect();
        NestogyError::invalid_field(
            field,
            format!("must be one of: {}", allowed.join(", ")),
        )
    })
}

/// 区分“字段缺省”和“显式 null”
///
/// 配合 `#[serde(default, deserialize_with = "deserialize_some")]` 用在
/// `Option<Option<T>>` 字段上：缺省为 `None`，`null` 为 `Some(None)`。
pub fn deserialize_some<'de, T, D>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    Deserialize::deserialize(deserializer).map(Some)
}

macro_rules! stored_enum {
    ($(#[$meta:meta])* $name:ident { $($(#[$vmeta:meta])* $variant:ident),+ $(,)? }) => {
        $(#[$meta])*
        #[derive(
            Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize,
            EnumString, AsRefStr, Display, EnumIter,
        )]
        #[serde(rename_all = "snake_case")]
        #[strum(serialize_all = "snake_case", ascii_case_insensitive)]
        pub enum $name {
            $($(#[$vmeta])* $variant),+
        }
    };
}

stored_enum!(
    /// 用户角色
    Role { Admin, Technician, Accountant }
);

stored_enum!(ClientStatus { Active, Inactive, Lead });

stored_enum!(AssetType {
    Workstation,
    Laptop,
    Server,
    Network,
    Printer,
    Mobile,
    Other,
});

stored_enum!(AssetStatus { Active, Inactive, Retired });

stored_enum!(SupportStatus { Supported, Unsupported, Pending });

stored_enum!(ContractStatus { Draft, Active, Expired, Terminated });

impl ContractStatus {
    /// 合同状态流转：draft→active，active→expired|terminated，draft→terminated
    pub fn can_transition_to(self, next: ContractStatus) -> bool {
        use ContractStatus::*;
        matches!(
            (self, next),
            (Draft, Active) | (Active, Expired) | (Active, Terminated) | (Draft, Terminated)
        )
    }
}

stored_enum!(TicketStatus {
    New,
    Open,
    InProgress,
    Waiting,
    Resolved,
    Closed,
});

stored_enum!(TicketPriority { Low, Medium, High, Critical });

stored_enum!(TicketSource { Manual, Rmm, Portal, Email });

stored_enum!(
    /// 可计费工时记录状态
    TimeEntryStatus { Draft, Submitted, Approved, Rejected, Invoiced }
);

impl TimeEntryStatus {
    pub fn is_locked(self) -> bool {
        matches!(self, TimeEntryStatus::Approved | TimeEntryStatus::Invoiced)
    }
}

stored_enum!(
    /// 员工打卡记录状态
    ClockStatus { InProgress, Completed, Approved, Rejected }
);

stored_enum!(InvoiceStatus { Draft, Sent, Paid, Void });

impl InvoiceStatus {
    /// draft→sent→paid，draft|sent→void
    pub fn can_transition_to(self, next: InvoiceStatus) -> bool {
        use InvoiceStatus::*;
        matches!(
            (self, next),
            (Draft, Sent) | (Sent, Paid) | (Draft, Void) | (Sent, Void)
        )
    }

    pub fn is_final(self) -> bool {
        matches!(self, InvoiceStatus::Paid | InvoiceStatus::Void)
    }
}

stored_enum!(MailOrderStatus {
    Pending,
    Submitted,
    Processing,
    Printing,
    InTransit,
    Delivered,
    Returned,
    Cancelled,
    Failed,
});

impl MailOrderStatus {
    pub fn is_cancellable(self) -> bool {
        matches!(self, MailOrderStatus::Pending | MailOrderStatus::Submitted)
    }

    /// 终态不再接受 PostGrid 的状态更新
    pub fn is_final(self) -> bool {
        matches!(
            self,
            MailOrderStatus::Delivered
                | MailOrderStatus::Returned
                | MailOrderStatus::Cancelled
                | MailOrderStatus::Failed
        )
    }

    /// PostGrid 状态名映射，未知状态返回 None
    pub fn from_provider(status: &str) -> Option<Self> {
        let normalized = status.trim().to_ascii_lowercase().replace(['-', ' '], "_");
        match normalized.as_str() {
            "ready" | "submitted" => Some(MailOrderStatus::Submitted),
            "processing" => Some(MailOrderStatus::Processing),
            "printing" | "printed" => Some(MailOrderStatus::Printing),
            "processed_for_delivery" | "in_transit" | "mailed" => Some(MailOrderStatus::InTransit),
            "completed" | "delivered" => Some(MailOrderStatus::Delivered),
            "returned_to_sender" | "returned" => Some(MailOrderStatus::Returned),
            "cancelled" | "canceled" => Some(MailOrderStatus::Cancelled),
            "failed" => Some(MailOrderStatus::Failed),
            _ => None,
        }
    }
}

stored_enum!(KbVisibility { Internal, Client, Public });

stored_enum!(KbStatus { Draft, Published, Archived });

stored_enum!(WebhookEventStatus { Pending, Processed, Failed });

stored_enum!(EmailProvider { Google, Microsoft });

stored_enum!(EmailAccountStatus {
    Pending,
    Connected,
    Error,
    Revoked,
});

stored_enum!(RmmVendor {
    Generic,
    Connectwise,
    Ninjaone,
    Datto,
});

/// 告警严重级别，按声明顺序比较
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    PartialOrd,
    Ord,
    Hash,
    Serialize,
    Deserialize,
    EnumString,
    AsRefStr,
    Display,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case", ascii_case_insensitive)]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// 宽松解析各家 RMM 的严重级别写法
    pub fn parse_lenient(value: &str) -> Option<Self> {
        let v = value.trim().to_ascii_lowercase();
        if let Ok(s) = v.parse::<Severity>() {
            return Some(s);
        }
        match v.as_str() {
            "informational" | "information" | "notice" | "ok" => Some(Severity::Info),
            "minor" => Some(Severity::Low),
            "warning" | "warn" | "moderate" | "major" => Some(Severity::Medium),
            "error" | "severe" => Some(Severity::High),
            "fatal" | "emergency" | "crit" | "disaster" => Some(Severity::Critical),
            // 数字级别：1 最低，5 最高
            "1" => Some(Severity::Info),
            "2" => Some(Severity::Low),
            "3" => Some(Severity::Medium),
            "4" => Some(Severity::High),
            "5" => Some(Severity::Critical),
            _ => None,
        }
    }
}
