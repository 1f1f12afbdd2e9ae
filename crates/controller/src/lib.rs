//! Reconciliation stage.
//!
//! For every analyzed page the controller runs one transaction against the
//! URL state store: settle the page's own record (Success or Fail), persist
//! the body, then walk the sub-URL set deciding per child whether to create a
//! Pending record, refresh ancestor paths, or propagate new paths through an
//! already-crawled subtree. Newly created children are handed back to the
//! caller for enqueueing, which is how the pipeline's cycle closes.

use anyhow::Context;
use chrono::Utc;
use tracing::{debug, error, info, warn};

use crawld_core::{urls, PageState, ParsedPageInfo};
use crawld_store::{FileStore, PageRecord, Storage, StoreError, StoreTransaction};

pub mod paths;

use paths::UrlPath;

pub struct Controller {
    depth: usize,
    storage: Storage,
    files: FileStore,
}

impl Controller {
    pub fn new(depth: u8, storage: Storage, files: FileStore) -> Self {
        Self {
            depth: usize::from(depth),
            storage,
            files,
        }
    }

    /// Reconcile one analyzed page. Never propagates an error to the worker
    /// loop: a failed transaction is logged and rolled back, and the retry
    /// scanner will resurface the page. Returns the URLs to enqueue.
    pub async fn process(&self, parsed: ParsedPageInfo) -> Vec<String> {
        let url = parsed.url.clone();
        match self.reconcile(parsed).await {
            Ok(new_urls) => new_urls,
            Err(e) => {
                error!(url = %url, error = %e, "reconciliation aborted");
                Vec::new()
            }
        }
    }

    async fn reconcile(&self, parsed: ParsedPageInfo) -> anyhow::Result<Vec<String>> {
        let domain = match urls::get_domain(&parsed.url) {
            Ok(domain) => domain,
            Err(e) => {
                error!(url = %parsed.url, error = %e, "cannot derive domain, dropping page");
                return Ok(Vec::new());
            }
        };
        let normalized = match urls::shortify(&parsed.url) {
            Ok(normalized) => normalized,
            Err(e) => {
                error!(url = %parsed.url, error = %e, "cannot normalize url, dropping page");
                return Ok(Vec::new());
            }
        };

        let mut tx = self.storage.begin().await.context("begin transaction")?;

        let mut record = match tx.get_for_update(&normalized).await {
            Ok(record) => record,
            Err(StoreError::NotFound) => {
                // Records are created ahead of reconciliation (seeds or a
                // parent's expansion), so this is either a locked row held by
                // a peer or a logic error. Either way: drop it, the retry
                // scanner re-issues the work.
                warn!(url = %normalized, "record unavailable for reconciliation");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e).context("lock page record"),
        };

        if record.page_state() == PageState::Success {
            info!(url = %normalized, "already processed");
            tx.commit().await?;
            return Ok(Vec::new());
        }

        if parsed.state == PageState::Fail {
            record.set_state(PageState::Fail);
            record.remark = parsed.remark;
            tx.update(&record).await.context("mark page failed")?;
            tx.commit().await?;
            return Ok(Vec::new());
        }

        record.set_state(PageState::Success);
        record.fetched_at = Some(Utc::now());
        record.domain = domain.clone();
        record.sub_urls = paths::encode_urls(&parsed.sub_urls)?;
        tx.update(&record).await.context("mark page fetched")?;

        // Best-effort: a filesystem problem loses the body, not the record.
        if let Err(e) = self.files.store(&domain, &normalized, &parsed.content).await {
            error!(url = %normalized, error = %e, "failed to store page body");
        }

        let parent_paths = paths::decode_paths(&record.paths)
            .with_context(|| format!("corrupt paths on {normalized}"))?;
        let to_enqueue = self.expand(&mut tx, parent_paths, parsed.sub_urls).await?;
        tx.commit().await?;
        Ok(to_enqueue)
    }

    /// Walk the sub-URL sets with an explicit work stack (descending through
    /// already-successful children can reach the whole subtree, so native
    /// recursion would be depth × fan-out deep). Each stack entry is a parent
    /// context: its ancestor path set plus its outbound URLs.
    async fn expand(
        &self,
        tx: &mut StoreTransaction,
        parent_paths: Vec<UrlPath>,
        sub_urls: Vec<String>,
    ) -> anyhow::Result<Vec<String>> {
        let mut to_enqueue = Vec::new();
        let mut stack = vec![(parent_paths, sub_urls)];

        while let Some((ancestor_paths, subs)) = stack.pop() {
            if !paths::has_expandable_path(&ancestor_paths, self.depth) {
                continue;
            }

            for sub in subs {
                let normalized = match urls::shortify(&sub) {
                    Ok(normalized) => normalized,
                    Err(e) => {
                        debug!(url = %sub, error = %e, "skipping unparseable sub-url");
                        continue;
                    }
                };
                // An ancestor linking back to itself is a cycle; revisiting it
                // through this parent would never terminate.
                if paths::in_ancestry(&ancestor_paths, &normalized) {
                    continue;
                }

                match tx.get_for_update(&normalized).await {
                    Err(StoreError::NotFound) => {
                        if tx.exists(&normalized).await? {
                            // Present but locked by a contending controller.
                            // Skip the path refresh; inserting would collide.
                            debug!(url = %normalized, "child locked elsewhere, skipping");
                            continue;
                        }
                        let child_paths = paths::extended_paths(&ancestor_paths, &normalized);
                        let child = PageRecord::new_pending(
                            &normalized,
                            urls::get_domain(&normalized).unwrap_or_default(),
                            paths::encode_paths(&child_paths)?,
                        );
                        tx.insert(&child).await.context("insert child record")?;
                        to_enqueue.push(sub);
                    }
                    Ok(mut child) => {
                        let mut child_paths = paths::decode_paths(&child.paths)
                            .with_context(|| format!("corrupt paths on {normalized}"))?;
                        let grew = paths::merge_paths(
                            &mut child_paths,
                            paths::extended_paths(&ancestor_paths, &normalized),
                        );
                        if grew {
                            child.paths = paths::encode_paths(&child_paths)?;
                            tx.update(&child).await.context("refresh child paths")?;
                        }
                        if child.page_state() == PageState::Success {
                            // Already crawled: nothing to enqueue, but its
                            // subtree must see the new ancestor paths so the
                            // depth bound stays accurate at every descendant.
                            let child_subs = paths::decode_urls(&child.sub_urls)?;
                            stack.push((child_paths, child_subs));
                        }
                        // Pending children are already queued, Fail children
                        // are terminal; refreshed paths are all they need.
                    }
                    Err(e) => return Err(e).context("lock child record"),
                }
            }
        }

        Ok(to_enqueue)
    }
}
