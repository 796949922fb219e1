use std::collections::BTreeSet;

use anyhow::Context;

use crate::data_access::DataAccess;
use crate::{Error, Interest, InterestId, Result, UserId};

#[derive(Clone)]
pub struct InterestGraph<D> {
    data_access: D,
}

impl<D: DataAccess> InterestGraph<D> {
    pub fn new(data_access: D) -> Self {
        InterestGraph { data_access }
    }

    pub async fn catalog(&self) -> Result<Vec<Interest>> {
        let interests = self.data_access
            .fetch_interests().await
            .context("Couldn't fetch interest catalog")?;
        Ok(interests)
    }

    pub async fn interests_of(&self, user_id: &UserId) -> Result<Vec<Interest>> {
        let interests = self.data_access
            .fetch_user_interests(user_id).await
            .with_context(|| format!("Couldn't fetch interests of user {user_id}"))?;
        Ok(interests)
    }

    pub async fn check_selection(&self, selection: &[InterestId]) -> Result<Vec<InterestId>> {
        let selection: BTreeSet<InterestId> = selection.iter().copied().collect();
        let catalog: BTreeSet<InterestId> = self.catalog().await?
            .into_iter()
            .map(|interest| interest.id)
            .collect();

        if let Some(unknown) = selection.difference(&catalog).next() {
            return Err(Error::validation(format!("Unknown interest: {unknown}")));
        }

        Ok(selection.into_iter().collect())
    }
}
