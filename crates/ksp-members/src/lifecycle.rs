use chrono::{Datelike, Utc};
use ksp_core::{Error, Member, MemberCodeSequence, MemberStatus, MemberStore, Result, Session};
use tracing::info;
use uuid::Uuid;

use crate::code::MemberCodeAllocator;

/// The three fields a member or admin may edit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemberProfile {
    pub full_name: String,
    pub phone: String,
    pub address: String,
}

impl MemberProfile {
    fn normalized(self) -> Result<Self> {
        let full_name = self.full_name.trim().to_string();
        if full_name.is_empty() {
            return Err(Error::InvalidInput("full name must not be empty".to_string()));
        }
        Ok(Self {
            full_name,
            phone: self.phone.trim().to_string(),
            address: self.address.trim().to_string(),
        })
    }
}

/// Onboarding and moderation of members. Rejection and removal delete the record.
pub struct MemberLifecycle<'a, S: ?Sized> {
    store: &'a S,
    codes: MemberCodeAllocator,
}

impl<'a, S> MemberLifecycle<'a, S>
where
    S: MemberStore + MemberCodeSequence + ?Sized,
{
    pub fn new(store: &'a S) -> Self {
        Self::with_allocator(store, MemberCodeAllocator::default())
    }

    pub fn with_allocator(store: &'a S, codes: MemberCodeAllocator) -> Self {
        Self { store, codes }
    }

    /// Creates a pending member under the identity the auth provider assigned to `session`.
    pub async fn register(&self, session: &Session, profile: MemberProfile) -> Result<Member> {
        let profile = profile.normalized()?;
        if self.store.member(session.user_id).await?.is_some() {
            return Err(Error::ValidationError(format!(
                "member {} is already registered",
                session.user_id
            )));
        }
        let member = Member {
            id: session.user_id,
            member_code: None,
            full_name: profile.full_name,
            phone: profile.phone,
            address: profile.address,
            status: MemberStatus::Pending,
            created_at: Utc::now(),
        };
        let member = self.store.insert_member(member).await?;
        info!("member {} registered, awaiting approval", member.id);
        Ok(member)
    }

    pub async fn approve(&self, session: &Session, member_id: Uuid) -> Result<Member> {
        session.require_admin("approving a member")?;
        let mut member = self.load(member_id).await?;
        if member.status != MemberStatus::Pending {
            return Err(Error::illegal_transition(
                "member",
                member.id,
                member.status,
                MemberStatus::Active,
            ));
        }
        let code = self.codes.allocate(self.store, Utc::now().year()).await?;
        member.member_code = Some(code);
        member.status = MemberStatus::Active;
        let member = self.write(member, MemberStatus::Pending, MemberStatus::Active).await?;
        info!(
            "member {} approved as {}",
            member.id,
            member.member_code.as_deref().unwrap_or_default()
        );
        Ok(member)
    }

    /// Updates name, phone and address only. Pending members cannot be edited.
    pub async fn edit_profile(
        &self,
        session: &Session,
        member_id: Uuid,
        profile: MemberProfile,
    ) -> Result<Member> {
        session.require_self_or_admin(member_id, "editing a profile")?;
        let profile = profile.normalized()?;
        let mut member = self.load(member_id).await?;
        if member.status == MemberStatus::Pending {
            return Err(Error::illegal_transition(
                "member",
                member.id,
                member.status,
                "edited",
            ));
        }
        let status = member.status;
        member.full_name = profile.full_name;
        member.phone = profile.phone;
        member.address = profile.address;
        let member = self.write(member, status, "edited").await?;
        info!("member {} profile updated", member.id);
        Ok(member)
    }

    /// Suspends an active member. Pending registrations are rejected instead.
    pub async fn deactivate(&self, session: &Session, member_id: Uuid) -> Result<Member> {
        session.require_admin("deactivating a member")?;
        let mut member = self.load(member_id).await?;
        if member.status != MemberStatus::Active {
            return Err(Error::illegal_transition(
                "member",
                member.id,
                member.status,
                MemberStatus::Inactive,
            ));
        }
        member.status = MemberStatus::Inactive;
        let member = self
            .write(member, MemberStatus::Active, MemberStatus::Inactive)
            .await?;
        info!("member {} deactivated", member.id);
        Ok(member)
    }

    /// Inactive back to active. The member code assigned at approval is kept.
    pub async fn reactivate(&self, session: &Session, member_id: Uuid) -> Result<Member> {
        session.require_admin("reactivating a member")?;
        let mut member = self.load(member_id).await?;
        if member.status != MemberStatus::Inactive {
            return Err(Error::illegal_transition(
                "member",
                member.id,
                member.status,
                MemberStatus::Active,
            ));
        }
        member.status = MemberStatus::Active;
        let member = self
            .write(member, MemberStatus::Inactive, MemberStatus::Active)
            .await?;
        info!("member {} reactivated", member.id);
        Ok(member)
    }

    /// Declines a pending registration by deleting it.
    pub async fn reject(&self, session: &Session, member_id: Uuid) -> Result<Member> {
        session.require_admin("rejecting a member")?;
        let member = self.load(member_id).await?;
        if member.status != MemberStatus::Pending {
            return Err(Error::illegal_transition(
                "member",
                member.id,
                member.status,
                "rejected",
            ));
        }
        self.delete(member).await
    }

    /// Deletes a member in any state. Irreversible.
    pub async fn remove(&self, session: &Session, member_id: Uuid) -> Result<Member> {
        session.require_admin("removing a member")?;
        let member = self.load(member_id).await?;
        self.delete(member).await
    }

    async fn delete(&self, member: Member) -> Result<Member> {
        if !self.store.delete_member(member.id).await? {
            return Err(Error::NotFound {
                entity: "member",
                id: member.id,
            });
        }
        info!("member {} deleted while {}", member.id, member.status);
        Ok(member)
    }

    /// Stores `member` only if the record is still `expected`. Otherwise reports the
    /// transition from whatever status the record holds now.
    async fn write(
        &self,
        member: Member,
        expected: MemberStatus,
        to: impl ToString,
    ) -> Result<Member> {
        let member_id = member.id;
        match self.store.update_member_if(member, expected).await? {
            Some(member) => Ok(member),
            None => {
                let current = self.load(member_id).await?;
                Err(Error::illegal_transition("member", member_id, current.status, to))
            }
        }
    }

    async fn load(&self, member_id: Uuid) -> Result<Member> {
        self.store.member(member_id).await?.ok_or(Error::NotFound {
            entity: "member",
            id: member_id,
        })
    }
}
