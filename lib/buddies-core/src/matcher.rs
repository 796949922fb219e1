use std::collections::BTreeSet;
use std::future::Future;

use anyhow::Context;

use crate::data_access::DataAccess;
use crate::{Interest, Result, UserId};

pub const MIN_SHARED_INTERESTS: usize = 2;

pub fn is_match(a: &BTreeSet<String>, b: &BTreeSet<String>) -> bool {
    a.intersection(b).count() >= MIN_SHARED_INTERESTS
}

fn titles(interests: Vec<Interest>) -> BTreeSet<String> {
    interests.into_iter().map(|interest| interest.title).collect()
}

/// Implementations must apply [`is_match`] and return ids in ascending order without the user
/// itself, so results stay symmetric and deterministic whatever the strategy.
pub trait MatchStrategy: 'static + Send + Sync + Clone {
    fn matches<D: DataAccess>(&self, data_access: &D, user_id: &UserId) -> impl Future<Output = anyhow::Result<Vec<UserId>>> + Send;
}

#[derive(Clone, Copy, Debug, Default)]
pub struct PerUserOverlap;

impl MatchStrategy for PerUserOverlap {
    async fn matches<D: DataAccess>(&self, data_access: &D, user_id: &UserId) -> anyhow::Result<Vec<UserId>> {
        let own = titles(data_access.fetch_user_interests(user_id).await?);

        let mut res = vec![];
        for other in data_access.fetch_user_ids().await? {
            if other == *user_id {
                continue;
            }
            let theirs = titles(data_access.fetch_user_interests(&other).await?);
            if is_match(&own, &theirs) {
                res.push(other);
            }
        }

        res.sort();
        Ok(res)
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct BulkOverlap;

impl MatchStrategy for BulkOverlap {
    async fn matches<D: DataAccess>(&self, data_access: &D, user_id: &UserId) -> anyhow::Result<Vec<UserId>> {
        let everyone: Vec<(UserId, BTreeSet<String>)> = data_access
            .fetch_all_user_interests().await?
            .into_iter()
            .map(|(id, interests)| (id, titles(interests)))
            .collect();

        let own = match everyone.iter().find(|(id, _)| id == user_id) {
            Some((_, own)) => own,
            None => return Ok(vec![]),
        };

        let mut res: Vec<UserId> = everyone.iter()
            .filter(|(id, theirs)| id != user_id && is_match(own, theirs))
            .map(|(id, _)| *id)
            .collect();

        res.sort();
        Ok(res)
    }
}

#[derive(Clone)]
pub struct Matcher<D, S> {
    data_access: D,
    strategy: S,
}

impl<D: DataAccess, S: MatchStrategy> Matcher<D, S> {
    pub fn new(data_access: D, strategy: S) -> Self {
        Matcher { data_access, strategy }
    }

    pub async fn compute_matches(&self, user_id: &UserId) -> Result<Vec<UserId>> {
        let matches = self.strategy
            .matches(&self.data_access, user_id).await
            .with_context(|| format!("Couldn't compute matches for {user_id}"))?;
        Ok(matches)
    }
}
