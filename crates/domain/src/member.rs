use crate::value_objects::MemberId;

/// 外部会员系统中的会员，本模块只读。
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Member {
    pub id: MemberId,
    pub name: String,
}

impl Member {
    pub fn new(id: MemberId, name: impl Into<String>) -> Self {
        Self {
            id,
            name: name.into(),
        }
    }
}
