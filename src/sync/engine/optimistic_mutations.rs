// Every mutation follows the same protocol: compute and apply the new visible state,
// persist it locally, and only then, when live, await the remote call. A failed remote
// call reverts the touched entities and raises one notice.

impl<P: EntityPayload> SyncEngine<P> {
    /// Creates an entity from `payload`.
    ///
    /// If the remote create fails the entity stays visible as local-only and is uploaded
    /// by the next successful create or [`flush_pending`](Self::flush_pending); the error
    /// is still returned.
    pub async fn create(&self, payload: P) -> Result<Entity<P>> {
        payload.validate()?;
        let span = info_span!(
            "sync.create",
            app = %self.inner.config.app,
            kind = %P::KIND
        );
        async move {
            let entity = self.inner.factory.create(payload);
            let session = {
                let mut state = self.inner.state.lock().await;
                state.visible.push(entity.clone());
                self.inner.commit(&state);
                let session = state.live_session();
                if session.is_some() {
                    state.begin_flight([entity.client_id.clone()]);
                }
                session
            };

            let Some((user_id, epoch)) = session else {
                event!(Level::DEBUG, client_id = %entity.client_id, "created locally");
                return Ok(entity);
            };

            let result = self
                .inner
                .remote
                .upsert_by_client_id(&user_id, entity.clone())
                .await;

            let mut state = self.inner.state.lock().await;
            state.end_flight([&entity.client_id]);
            match result {
                Ok(remote_id) => {
                    let late = if state.is_current(epoch) {
                        let adopted = state.adopt_remote_id(&entity.client_id, &remote_id);
                        self.inner
                            .commit_adopted(&state, adopted, &entity.client_id, &remote_id)
                    } else {
                        None
                    };
                    drop(state);

                    // Deleted while the create was in flight.
                    self.soft_delete_late(&user_id, late.into_iter().collect())
                        .await;
                    if let Err(err) = self.flush_pending().await {
                        event!(Level::WARN, error = %err, "retry of pending creates failed");
                    }
                    Ok(Entity {
                        remote_id: Some(remote_id),
                        ..entity
                    })
                }
                Err(err) => {
                    event!(Level::WARN, error = %err, "remote create failed; kept local-only");
                    self.inner.notify_failure(MutationKind::Create, 1, &err);
                    Err(err)
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Applies an arbitrary field change to the entity named by `key`.
    pub async fn update<F>(&self, key: &str, change: F) -> Result<Entity<P>>
    where
        F: FnOnce(&mut P) + Send,
    {
        self.mutate_one(key, MutationKind::Update, move |payload| {
            change(payload);
            Ok(())
        })
        .await
    }

    /// Flips the kind's boolean state (task completion, note pin, ...).
    pub async fn toggle(&self, key: &str) -> Result<Entity<P>> {
        self.mutate_one(key, MutationKind::Toggle, |payload| {
            if payload.toggle() {
                Ok(())
            } else {
                Err(SyncError::Validation(format!(
                    "{} cannot be toggled",
                    P::KIND
                )))
            }
        })
        .await
    }

    /// Moves the entity into `group` at `position`.
    pub async fn move_to(&self, key: &str, group: &str, position: i64) -> Result<Entity<P>> {
        let group = group.to_string();
        self.mutate_one(key, MutationKind::Move, move |payload| {
            if payload.set_group(&group) && payload.set_position(position) {
                Ok(())
            } else {
                Err(SyncError::Validation(format!("{} cannot be moved", P::KIND)))
            }
        })
        .await
    }

    /// Rewrites the order of `group` to `ordered_keys`.
    ///
    /// Returns `Ok(false)` and changes nothing when the proposed keys do not name exactly
    /// the group's current members (a member was moved away concurrently, a key is
    /// unknown or repeated).
    pub async fn reorder(&self, group: &str, ordered_keys: &[String]) -> Result<bool> {
        let span = info_span!(
            "sync.reorder",
            app = %self.inner.config.app,
            group = %group,
            members = ordered_keys.len()
        );
        async move {
            let (before, after, session) = {
                let mut state = self.inner.state.lock().await;
                let members: Vec<usize> = state
                    .visible
                    .iter()
                    .enumerate()
                    .filter(|(_, entity)| {
                        entity.payload.group() == group && entity.payload.position().is_some()
                    })
                    .map(|(index, _)| index)
                    .collect();

                let mut proposed = Vec::with_capacity(ordered_keys.len());
                for key in ordered_keys {
                    let slot = members
                        .iter()
                        .copied()
                        .find(|&index| state.visible[index].matches_key(key));
                    match slot {
                        Some(index) if !proposed.contains(&index) => proposed.push(index),
                        _ => {
                            event!(Level::DEBUG, key = %key, "reorder rejected: membership mismatch");
                            return Ok(false);
                        }
                    }
                }
                if proposed.len() != members.len() {
                    event!(Level::DEBUG, "reorder rejected: membership mismatch");
                    return Ok(false);
                }

                let now = self.inner.clock.now_ms();
                let mut before = Vec::new();
                let mut after = Vec::new();
                let mut reordered = Vec::with_capacity(proposed.len());
                for (rank, &index) in proposed.iter().enumerate() {
                    let mut entity = state.visible[index].clone();
                    let rank = rank as i64;
                    if entity.payload.position() != Some(rank) {
                        before.push(entity.clone());
                        entity.payload.set_position(rank);
                        entity.touch(now);
                        after.push(entity.clone());
                    }
                    reordered.push(entity);
                }
                for (&slot, entity) in members.iter().zip(reordered) {
                    state.visible[slot] = entity;
                }

                self.inner.commit(&state);
                let session = state.live_session();
                if session.is_some() && !after.is_empty() {
                    state.begin_flight(after.iter().map(|entity| entity.client_id.clone()));
                }
                (before, after, session)
            };

            if after.is_empty() {
                return Ok(true);
            }
            let Some((user_id, epoch)) = session else {
                return Ok(true);
            };

            let pushed = self
                .push_changes(MutationKind::Reorder, &user_id, epoch, before, after)
                .await;
            if pushed.is_err() {
                let mut state = self.inner.state.lock().await;
                realign_group(&mut state.visible, group);
                self.inner.commit(&state);
            }
            pushed.map(|_| true)
        }
        .instrument(span)
        .await
    }

    async fn mutate_one<F>(&self, key: &str, mutation: MutationKind, change: F) -> Result<Entity<P>>
    where
        F: FnOnce(&mut P) -> Result<()> + Send,
    {
        let span = info_span!(
            "sync.mutate",
            app = %self.inner.config.app,
            mutation = ?mutation,
            key = %key
        );
        async move {
            let (before, after, session) = {
                let mut state = self.inner.state.lock().await;
                let position = state
                    .position_of(key)
                    .ok_or_else(|| SyncError::NotFound(key.to_string()))?;
                let before = state.visible[position].clone();
                let mut after = before.clone();
                change(&mut after.payload)?;
                after.payload.validate()?;
                if after.payload == before.payload {
                    return Ok(before);
                }

                after.touch(self.inner.clock.now_ms());
                state.visible[position] = after.clone();
                self.inner.commit(&state);
                let session = state.live_session();
                if session.is_some() {
                    state.begin_flight([after.client_id.clone()]);
                }
                (before, after, session)
            };

            let Some((user_id, epoch)) = session else {
                return Ok(after);
            };

            self.push_changes(mutation, &user_id, epoch, vec![before], vec![after.clone()])
                .await?;
            Ok(self.get(&after.client_id).await.unwrap_or(after))
        }
        .instrument(span)
        .await
    }

    /// Sends already-applied changes upstream. On the first failure every touched entity
    /// that was not changed again meanwhile is reverted, one notice is raised and the
    /// error returned.
    async fn push_changes(
        &self,
        mutation: MutationKind,
        user_id: &str,
        epoch: u64,
        before: Vec<Entity<P>>,
        after: Vec<Entity<P>>,
    ) -> Result<()> {
        let mut confirmed = Vec::with_capacity(after.len());
        let mut failure = None;
        for entity in &after {
            match self
                .inner
                .remote
                .upsert_by_client_id(user_id, entity.clone())
                .await
            {
                Ok(remote_id) => confirmed.push((entity.client_id.clone(), remote_id)),
                Err(err) => {
                    failure = Some(err);
                    break;
                }
            }
        }

        let mut state = self.inner.state.lock().await;
        state.end_flight(after.iter().map(|entity| &entity.client_id));
        if !state.is_current(epoch) {
            return failure.map_or(Ok(()), Err);
        }

        let reverted = match &failure {
            Some(_) => state.revert_entities(&before, &after),
            None => 0,
        };
        let mut late = Vec::new();
        for (client_id, remote_id) in &confirmed {
            state.dirty.remove(client_id);
            let adopted = state.adopt_remote_id(client_id, remote_id);
            late.extend(
                self.inner
                    .commit_adopted(&state, adopted, client_id, remote_id),
            );
        }
        self.inner.commit(&state);
        drop(state);
        self.soft_delete_late(user_id, late).await;

        match failure {
            None => Ok(()),
            Some(err) => {
                event!(
                    Level::WARN,
                    error = %err,
                    reverted,
                    "remote mutation failed; local change reverted"
                );
                self.inner.notify_failure(mutation, after.len(), &err);
                Err(err)
            }
        }
    }
}

/// Re-sorts the members of `group` by position inside the slots they already occupy.
fn realign_group<P: EntityPayload>(visible: &mut [Entity<P>], group: &str) {
    let slots: Vec<usize> = visible
        .iter()
        .enumerate()
        .filter(|(_, entity)| entity.payload.group() == group && entity.payload.position().is_some())
        .map(|(index, _)| index)
        .collect();
    let mut members: Vec<Entity<P>> = slots.iter().map(|&slot| visible[slot].clone()).collect();
    members.sort_by_key(|entity| entity.payload.position());
    for (slot, entity) in slots.into_iter().zip(members) {
        visible[slot] = entity;
    }
}
