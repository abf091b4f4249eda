impl<P: EntityPayload> SyncEngine<P> {
    /// Deletes one entity, keeping it restorable for the grace window.
    pub async fn delete(&self, key: &str) -> Result<Tombstone<P>> {
        let mut tombstones = self.delete_many(&[key.to_string()]).await?;
        tombstones
            .pop()
            .ok_or_else(|| SyncError::NotFound(key.to_string()))
    }

    /// Deletes a batch as one user action: one visible update, one notice carrying the
    /// undo affordance.
    ///
    /// Fails with `NotFound` before changing anything if any key is unknown. When live,
    /// synced entities are soft-deleted remotely right away; entities whose soft-delete
    /// failed (or never ran) are put back.
    pub async fn delete_many(&self, keys: &[String]) -> Result<Vec<Tombstone<P>>> {
        let span = info_span!(
            "sync.delete",
            app = %self.inner.config.app,
            count = keys.len()
        );
        async move {
            let (scope, removed, session) = {
                let mut state = self.inner.state.lock().await;
                let mut positions = Vec::with_capacity(keys.len());
                for key in keys {
                    let position = state
                        .position_of(key)
                        .ok_or_else(|| SyncError::NotFound(key.to_string()))?;
                    if !positions.contains(&position) {
                        positions.push(position);
                    }
                }
                if positions.is_empty() {
                    return Ok(Vec::new());
                }
                positions.sort_unstable();

                let now = self.inner.clock.now_ms();
                let grace = self.inner.grace_ms();
                let scope = state.phase.scope();
                let mut removed = Vec::with_capacity(positions.len());
                for &position in positions.iter().rev() {
                    let entity = state.visible.remove(position);
                    removed.push((position, Tombstone::new(entity, now)));
                }
                removed.reverse();

                for (_, tombstone) in &removed {
                    state
                        .schedule
                        .schedule(tombstone.key(), tombstone.fire_at(grace));
                    state.tombstones.push(TombstoneEntry {
                        scope: scope.clone(),
                        tombstone: tombstone.clone(),
                    });
                }
                self.inner.commit(&state);
                self.inner.persist_tombstones(&state, &scope, &[]);

                let restore_keys = removed
                    .iter()
                    .map(|(_, tombstone)| tombstone.key().to_string())
                    .collect();
                self.inner.notify(
                    Notice::info(outcome(P::KIND, removed.len(), "deleted"))
                        .with_action(NoticeAction::Restore(restore_keys)),
                );
                (scope, removed, state.live_session())
            };

            let tombstones: Vec<Tombstone<P>> = removed
                .iter()
                .map(|(_, tombstone)| tombstone.clone())
                .collect();
            let Some((user_id, epoch)) = session else {
                return Ok(tombstones);
            };

            let mut failure = None;
            for (index, (_, tombstone)) in removed.iter().enumerate() {
                let Some(remote_id) = tombstone.entity.remote_id.as_deref() else {
                    continue;
                };
                if let Err(err) = self.inner.remote.soft_delete(&user_id, remote_id).await {
                    failure = Some((index, err));
                    break;
                }
            }
            let Some((failed_at, err)) = failure else {
                return Ok(tombstones);
            };

            let mut state = self.inner.state.lock().await;
            if !state.is_current(epoch) {
                return Err(err);
            }

            let mut reinstated = Vec::new();
            for (position, tombstone) in removed[failed_at..]
                .iter()
                .filter(|(_, tombstone)| tombstone.entity.is_synced())
            {
                // Already restored by a newer intent.
                let Some(at) = state
                    .tombstones
                    .iter()
                    .position(|entry| entry.scope == scope && entry.tombstone.key() == tombstone.key())
                else {
                    continue;
                };
                let entry = state.tombstones.remove(at);
                state.schedule.cancel(entry.tombstone.key());
                let position = (*position).min(state.visible.len());
                reinstated.push(entry.tombstone.key().to_string());
                state.visible.insert(position, entry.tombstone.entity);
            }
            self.inner.commit(&state);
            self.inner.persist_tombstones(&state, &scope, &reinstated);

            event!(
                Level::WARN,
                error = %err,
                reinstated = reinstated.len(),
                "remote soft-delete failed; entities put back"
            );
            self.inner
                .notify_failure(MutationKind::Delete, reinstated.len().max(1), &err);
            Err(err)
        }
        .instrument(span)
        .await
    }

    /// Undoes one deletion. Returns `false` if there was nothing restorable.
    pub async fn restore(&self, key: &str) -> Result<bool> {
        Ok(self.restore_many(&[key.to_string()]).await? == 1)
    }

    /// Undoes a batch of deletions; returns how many entities came back.
    ///
    /// Tombstones are looked up in memory first, then in the persisted list of the current
    /// scope (the in-memory queue does not survive a reload). A tombstone past its grace
    /// window is discarded and purged instead of restored. If the remote restore fails the
    /// re-insertion is rolled back: an expired server copy drops the tombstone, any other
    /// failure re-tombstones the entity with its original deletion time.
    pub async fn restore_many(&self, keys: &[String]) -> Result<usize> {
        let span = info_span!(
            "sync.restore",
            app = %self.inner.config.app,
            count = keys.len()
        );
        async move {
            let (scope, restored, stale, session) = {
                let mut state = self.inner.state.lock().await;
                let now = self.inner.clock.now_ms();
                let grace = self.inner.grace_ms();
                let scope = state.phase.scope();

                let mut persisted: Option<Vec<Tombstone<P>>> = None;
                let mut restored: Vec<Tombstone<P>> = Vec::new();
                let mut stale: Vec<Tombstone<P>> = Vec::new();
                for key in keys {
                    let in_memory = state.tombstones.iter().position(|entry| {
                        entry.scope == scope && entry.tombstone.entity.matches_key(key)
                    });
                    let tombstone = match in_memory {
                        Some(at) => state.tombstones.remove(at).tombstone,
                        None => {
                            let persisted = persisted
                                .get_or_insert_with(|| self.inner.store.load_tombstones::<P>(&scope));
                            match persisted.iter().position(|t| t.entity.matches_key(key)) {
                                Some(at) => persisted.remove(at),
                                None => {
                                    event!(Level::DEBUG, key = %key, "nothing to restore");
                                    continue;
                                }
                            }
                        }
                    };

                    state.schedule.cancel(tombstone.key());
                    if tombstone.is_restorable_at(now, grace)
                        && state.position_of(tombstone.key()).is_none()
                    {
                        restored.push(tombstone);
                    } else {
                        stale.push(tombstone);
                    }
                }

                if restored.is_empty() && stale.is_empty() {
                    return Ok(0);
                }

                for tombstone in &restored {
                    state.visible.push(tombstone.entity.clone());
                }
                let dropped: Vec<String> = restored
                    .iter()
                    .chain(&stale)
                    .map(|tombstone| tombstone.key().to_string())
                    .collect();
                self.inner.commit(&state);
                self.inner.persist_tombstones(&state, &scope, &dropped);

                let session = state.live_session();
                if session.is_some() {
                    state.begin_flight(
                        restored
                            .iter()
                            .filter(|tombstone| tombstone.entity.is_synced())
                            .map(|tombstone| tombstone.key().to_string()),
                    );
                }
                if !restored.is_empty() {
                    self.inner
                        .notify(Notice::info(outcome(P::KIND, restored.len(), "restored")));
                }
                if !stale.is_empty() {
                    event!(
                        Level::DEBUG,
                        stale = stale.len(),
                        "discarded tombstones past the grace window"
                    );
                }
                (scope, restored, stale, session)
            };

            let Some((user_id, epoch)) = session else {
                return Ok(restored.len());
            };

            let stale_ids: Vec<String> = stale
                .iter()
                .filter_map(|tombstone| tombstone.entity.remote_id.clone())
                .collect();
            self.permanent_delete_all(&user_id, &stale_ids).await;

            let mut failure = None;
            for (index, tombstone) in restored.iter().enumerate() {
                let Some(remote_id) = tombstone.entity.remote_id.as_deref() else {
                    continue;
                };
                if let Err(err) = self.inner.remote.restore(&user_id, remote_id).await {
                    failure = Some((index, err));
                    break;
                }
            }

            let mut state = self.inner.state.lock().await;
            state.end_flight(
                restored
                    .iter()
                    .filter(|tombstone| tombstone.entity.is_synced())
                    .map(|tombstone| &tombstone.entity.client_id),
            );
            let Some((failed_at, err)) = failure else {
                return Ok(restored.len());
            };
            if !state.is_current(epoch) {
                return Err(err);
            }

            let grace = self.inner.grace_ms();
            let expired = err.kind() == ErrorKind::RestoreExpired;
            let mut rolled_back = 0;
            let mut dropped = Vec::new();
            let mut expired_ids = Vec::new();
            for (offset, tombstone) in restored[failed_at..]
                .iter()
                .filter(|tombstone| tombstone.entity.is_synced())
                .enumerate()
            {
                let Some(position) = state.position_of(tombstone.key()) else {
                    continue;
                };
                let entity = state.visible.remove(position);
                rolled_back += 1;

                if offset == 0 && expired {
                    dropped.push(entity.client_id.clone());
                    expired_ids.extend(entity.remote_id.clone());
                    continue;
                }
                let tombstone = Tombstone::new(entity, tombstone.deleted_at);
                state
                    .schedule
                    .schedule(tombstone.key(), tombstone.fire_at(grace));
                state.tombstones.push(TombstoneEntry {
                    scope: scope.clone(),
                    tombstone,
                });
            }
            self.inner.commit(&state);
            self.inner.persist_tombstones(&state, &scope, &dropped);
            drop(state);

            event!(
                Level::WARN,
                error = %err,
                rolled_back,
                "remote restore failed; re-insertion rolled back"
            );
            self.inner
                .notify_failure(MutationKind::Restore, rolled_back.max(1), &err);
            self.permanent_delete_all(&user_id, &expired_ids).await;
            Err(err)
        }
        .instrument(span)
        .await
    }

    /// Purges every tombstone whose grace window has elapsed; returns how many went.
    ///
    /// Also sweeps expired tombstones of the current scope that are only known from the
    /// persisted list. Server copies are permanently deleted only for the live user's
    /// scope. Another user's tombstones with a server copy leave memory but stay
    /// persisted, so that user's next live session sweeps them remotely.
    pub async fn purge_expired(&self) -> usize {
        let (purged, remote) = {
            let mut state = self.inner.state.lock().await;
            let now = self.inner.clock.now_ms();
            let grace = self.inner.grace_ms();
            let due = state.schedule.take_due(now);

            let mut purged: Vec<TombstoneEntry<P>> = Vec::new();
            state.tombstones.retain(|entry| {
                if due.iter().any(|key| key == entry.tombstone.key()) {
                    purged.push(entry.clone());
                    false
                } else {
                    true
                }
            });

            let scope = state.phase.scope();
            let leftovers: Vec<Tombstone<P>> = self
                .inner
                .store
                .load_tombstones::<P>(&scope)
                .into_iter()
                .filter(|stale| {
                    !stale.is_restorable_at(now, grace)
                        && !state
                            .tombstones
                            .iter()
                            .chain(&purged)
                            .any(|entry| entry.scope == scope && entry.tombstone.key() == stale.key())
                })
                .collect();
            purged.extend(leftovers.into_iter().map(|tombstone| TombstoneEntry {
                scope: scope.clone(),
                tombstone,
            }));

            if purged.is_empty() {
                return 0;
            }

            let deferred = |entry: &TombstoneEntry<P>| {
                entry.scope.user_id().is_some()
                    && entry.scope != scope
                    && entry.tombstone.entity.is_synced()
            };
            let mut scopes: Vec<&CacheScope> = Vec::new();
            for entry in &purged {
                if !scopes.contains(&&entry.scope) {
                    scopes.push(&entry.scope);
                }
            }
            for purged_scope in scopes {
                let dropped: Vec<String> = purged
                    .iter()
                    .filter(|entry| &entry.scope == purged_scope && !deferred(*entry))
                    .map(|entry| entry.tombstone.key().to_string())
                    .collect();
                self.inner.persist_tombstones(&state, purged_scope, &dropped);
            }

            let remote = state.live_session().map(|(user_id, _)| {
                let live_scope = CacheScope::user(user_id.clone());
                let remote_ids: Vec<String> = purged
                    .iter()
                    .filter(|entry| entry.scope == live_scope)
                    .filter_map(|entry| entry.tombstone.entity.remote_id.clone())
                    .collect();
                (user_id, remote_ids)
            });
            (purged.len(), remote)
        };

        if let Some((user_id, remote_ids)) = remote {
            self.permanent_delete_all(&user_id, &remote_ids).await;
        }
        event!(Level::DEBUG, app = %self.inner.config.app, purged, "expired tombstones purged");
        purged
    }

    /// Soft-deletes server copies whose entity was deleted before its `remote_id` was
    /// known. Entities restored meanwhile are skipped; on failure the purge still removes
    /// the server copy.
    async fn soft_delete_late(&self, user_id: &str, late: Vec<(String, String)>) {
        for (client_id, remote_id) in late {
            if !self.inner.state.lock().await.is_tombstoned(&client_id) {
                continue;
            }
            match self.inner.remote.soft_delete(user_id, &remote_id).await {
                Ok(()) => event!(Level::DEBUG, remote_id = %remote_id, "late soft-delete issued"),
                Err(err) => event!(
                    Level::WARN,
                    remote_id = %remote_id,
                    error = %err,
                    "late soft-delete failed; server copy stays live until purge"
                ),
            }
        }
    }

    async fn permanent_delete_all(&self, user_id: &str, remote_ids: &[String]) {
        for remote_id in remote_ids {
            if let Err(err) = self.inner.remote.permanent_delete(user_id, remote_id).await {
                event!(
                    Level::WARN,
                    remote_id = %remote_id,
                    error = %err,
                    "permanent delete failed; server copy stays soft-deleted"
                );
            }
        }
    }
}
