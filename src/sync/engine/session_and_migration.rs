impl<P: EntityPayload> SyncEngine<P> {
    /// Feeds an identity-provider update into the session state machine.
    ///
    /// While the provider is still loading nothing is decided. A settled user moves the
    /// session through `AuthPending` into either `Migrating` or `Live`; no user signs out.
    pub async fn handle_identity(&self, identity: IdentityState) -> Result<SessionPhase> {
        if identity.is_loading {
            return Ok(self.phase().await);
        }

        match identity.settled_user() {
            Some(user_id) => self.sign_in(user_id).await,
            None => {
                self.sign_out().await;
                Ok(SessionPhase::Anonymous)
            }
        }
    }

    /// `Anonymous -> AuthPending`, then resolves the pending session.
    ///
    /// A repeated sign-in for the user already in session is a no-op; a different user
    /// first signs the current one out.
    pub async fn sign_in(&self, user_id: &str) -> Result<SessionPhase> {
        if user_id.trim().is_empty() {
            return Err(SyncError::Validation("user id must not be empty".to_string()));
        }

        {
            let mut state = self.inner.state.lock().await;
            match state.phase.user_id() {
                Some(current) if current == user_id => return Ok(state.phase.clone()),
                Some(_) => self.reset_to_anonymous(&mut state),
                None => {}
            }
            state.phase = SessionPhase::AuthPending {
                user_id: user_id.to_string(),
            };
            state.epoch += 1;
            event!(
                Level::INFO,
                app = %self.inner.config.app,
                user_id = %user_id,
                "sign-in observed"
            );
        }

        self.resolve_auth_pending().await
    }

    /// `* -> Anonymous`: tears down the live subscription and falls back to the anonymous
    /// cache, which never holds another user's data.
    pub async fn sign_out(&self) {
        let mut state = self.inner.state.lock().await;
        if state.phase == SessionPhase::Anonymous {
            return;
        }
        self.reset_to_anonymous(&mut state);
        event!(Level::INFO, app = %self.inner.config.app, "signed out");
    }

    /// Re-attempts a failed migration from the same local snapshot.
    pub async fn retry_migration(&self) -> Result<SessionPhase> {
        {
            let state = self.inner.state.lock().await;
            if !matches!(state.phase, SessionPhase::AuthPending { .. }) {
                return Err(SyncError::InvalidState(format!(
                    "migration can only be retried while auth is pending, session is {}",
                    state.phase
                )));
            }
        }
        self.resolve_auth_pending().await
    }

    /// Uploads every visible entity that has no `remote_id` yet, plus synced entities
    /// whose latest edit the server has not confirmed.
    ///
    /// Covers creates whose remote call failed earlier, entities created while a
    /// migration was running and edits made during it. Stops at the first failure; the
    /// rest stay pending.
    pub async fn flush_pending(&self) -> Result<usize> {
        let (user_id, epoch, pending) = {
            let mut state = self.inner.state.lock().await;
            let Some((user_id, epoch)) = state.live_session() else {
                return Ok(0);
            };
            let pending: Vec<Entity<P>> = state
                .visible
                .iter()
                .filter(|entity| {
                    (!entity.is_synced() || state.dirty.contains(&entity.client_id))
                        && !state.in_flight.contains_key(&entity.client_id)
                })
                .cloned()
                .collect();
            state.begin_flight(pending.iter().map(|entity| entity.client_id.clone()));
            (user_id, epoch, pending)
        };

        if pending.is_empty() {
            return Ok(0);
        }

        let span = info_span!(
            "sync.flush_pending",
            app = %self.inner.config.app,
            pending = pending.len()
        );
        async move {
            let mut synced = 0usize;
            let mut failure = None;
            let mut late = Vec::new();

            for (index, entity) in pending.iter().enumerate() {
                let result = self
                    .inner
                    .remote
                    .upsert_by_client_id(&user_id, entity.clone())
                    .await;

                let mut state = self.inner.state.lock().await;
                match result {
                    Ok(remote_id) => {
                        state.end_flight([&entity.client_id]);
                        if !state.is_current(epoch) {
                            continue;
                        }
                        let was_dirty = state.dirty.remove(&entity.client_id);
                        let adopted = state.adopt_remote_id(&entity.client_id, &remote_id);
                        if was_dirty || adopted.changed() {
                            synced += 1;
                        }
                        late.extend(self.inner.commit_adopted(
                            &state,
                            adopted,
                            &entity.client_id,
                            &remote_id,
                        ));
                    }
                    Err(err) => {
                        state.end_flight(pending[index..].iter().map(|entity| &entity.client_id));
                        failure = Some(err);
                        break;
                    }
                }
            }
            self.soft_delete_late(&user_id, late).await;

            match failure {
                None => {
                    event!(Level::DEBUG, synced, "pending entities flushed");
                    Ok(synced)
                }
                Some(err) => {
                    event!(Level::WARN, error = %err, synced, "pending flush stopped");
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    async fn resolve_auth_pending(&self) -> Result<SessionPhase> {
        let migration = {
            let mut state = self.inner.state.lock().await;
            let SessionPhase::AuthPending { user_id } = state.phase.clone() else {
                return Ok(state.phase.clone());
            };

            let pending: Vec<Entity<P>> = state
                .visible
                .iter()
                .filter(|entity| !entity.is_synced())
                .cloned()
                .collect();

            // Check-then-set under one lock: a second sign-in event cannot start a
            // second migration.
            if self.inner.store.is_migrated(&user_id) || pending.is_empty() {
                self.enter_live(&mut state, &user_id);
                None
            } else {
                state.phase = SessionPhase::Migrating {
                    user_id: user_id.clone(),
                };
                Some((user_id, state.epoch, pending))
            }
        };

        match migration {
            Some((user_id, epoch, snapshot)) => self.migrate(user_id, epoch, snapshot).await,
            None => {
                self.after_live().await;
                Ok(self.phase().await)
            }
        }
    }

    /// `Migrating -> Live` on success, `Migrating -> AuthPending` on failure.
    async fn migrate(
        &self,
        user_id: String,
        epoch: u64,
        snapshot: Vec<Entity<P>>,
    ) -> Result<SessionPhase> {
        let span = info_span!(
            "sync.migrate",
            app = %self.inner.config.app,
            user_id = %user_id,
            entities = snapshot.len()
        );
        async move {
            let sent: HashMap<String, i64> = snapshot
                .iter()
                .map(|entity| (entity.client_id.clone(), entity.updated_at))
                .collect();
            let result = self.inner.remote.bulk_upsert(&user_id, snapshot).await;

            let mut state = self.inner.state.lock().await;
            let still_migrating = state.epoch == epoch
                && state.phase
                    == SessionPhase::Migrating {
                        user_id: user_id.clone(),
                    };
            if !still_migrating {
                event!(Level::DEBUG, "migration result arrived for a stale session");
                return result.map(|_| state.phase.clone());
            }

            match result {
                Ok(mapping) => {
                    // Unmapped entities (created mid-migration) are carried over unsynced.
                    let migrated = rewrite_with_remote_ids(state.visible.clone(), &mapping);
                    let user_scope = CacheScope::user(user_id.clone());
                    let cached = self.inner.store.load::<P>(&user_scope);

                    // Deleted while the upload was running; the server got a live copy.
                    let mut late = Vec::new();
                    for entry in state
                        .tombstones
                        .iter_mut()
                        .filter(|entry| entry.scope == CacheScope::Anonymous)
                    {
                        let client_id = entry.tombstone.entity.client_id.clone();
                        if let Some(remote_id) = mapping.get(&client_id) {
                            entry.scope = user_scope.clone();
                            entry.tombstone.entity.remote_id = Some(remote_id.clone());
                            late.push((client_id, remote_id.clone()));
                        }
                    }
                    let moved: Vec<String> =
                        late.iter().map(|(client_id, _)| client_id.clone()).collect();

                    self.inner.store.mark_migrated(&user_id);
                    self.inner.store.clear(&CacheScope::Anonymous);
                    self.inner
                        .persist_tombstones(&state, &CacheScope::Anonymous, &moved);

                    state.phase = SessionPhase::Live {
                        user_id: user_id.clone(),
                    };
                    state.visible = union_by_client_id(cached, migrated);
                    state.last_remote = None;
                    self.inner.commit(&state);
                    self.inner.persist_tombstones(&state, &user_scope, &[]);

                    // Edited while the upload was running; the server holds the older copy.
                    let edited: Vec<String> = state
                        .visible
                        .iter()
                        .filter(|entity| {
                            sent.get(&entity.client_id)
                                .is_some_and(|updated_at| entity.updated_at > *updated_at)
                        })
                        .map(|entity| entity.client_id.clone())
                        .collect();
                    state.dirty.extend(edited);
                    event!(
                        Level::INFO,
                        migrated = mapping.len(),
                        deleted_meanwhile = late.len(),
                        "anonymous data migrated"
                    );
                    drop(state);

                    self.soft_delete_late(&user_id, late).await;
                    self.after_live().await;
                    Ok(SessionPhase::Live { user_id })
                }
                Err(err) => {
                    state.phase = SessionPhase::AuthPending {
                        user_id: user_id.clone(),
                    };
                    event!(Level::WARN, error = %err, "migration failed; local data kept");
                    self.inner.notify(
                        Notice::failure(
                            format!(
                                "Couldn't move your {} to your account",
                                plural(P::KIND, state.visible.len())
                            ),
                            err.kind(),
                        )
                        .with_action(NoticeAction::Retry(RetryTarget::Migration)),
                    );
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    fn enter_live(&self, state: &mut EngineState<P>, user_id: &str) {
        state.phase = SessionPhase::Live {
            user_id: user_id.to_string(),
        };
        state.visible = self.inner.store.load::<P>(&state.phase.scope());
        state.last_remote = None;
        self.inner.publish(state);
        event!(Level::INFO, app = %self.inner.config.app, user_id = %user_id, "session live");
    }

    /// Opens the live subscription, purges tombstones that expired while signed out and
    /// uploads anything still pending.
    ///
    /// Failed creates already raised their notice; unconfirmed edits raise one here.
    async fn after_live(&self) {
        self.start_subscription().await;
        self.purge_expired().await;
        if let Err(err) = self.flush_pending().await {
            event!(Level::WARN, error = %err, "pending entities left for a later sync");
            let unsaved = self.inner.state.lock().await.dirty.len();
            if unsaved > 0 {
                self.inner.notify(
                    Notice::failure(
                        MutationKind::Update.failure_message(P::KIND, unsaved),
                        err.kind(),
                    )
                    .with_action(NoticeAction::Retry(RetryTarget::PendingSync)),
                );
            }
        }
    }

    fn reset_to_anonymous(&self, state: &mut EngineState<P>) {
        if let Some(handle) = state.subscription.take() {
            handle.abort();
        }
        state.phase = SessionPhase::Anonymous;
        state.epoch += 1;
        state.visible = self.inner.store.load::<P>(&CacheScope::Anonymous);
        state.last_remote = None;
        state.in_flight.clear();
        state.dirty.clear();
        self.inner.publish(state);
    }
}
