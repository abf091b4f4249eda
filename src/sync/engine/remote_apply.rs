impl<P: EntityPayload> SyncEngine<P> {
    /// Merges one push from the live subscription into visible state.
    ///
    /// Ignored unless the session is live. A `Loading` snapshot or one identical to the
    /// last applied push is a no-op. Returns `true` if the visible collection changed.
    pub async fn apply_remote_snapshot(&self, snapshot: RemoteSnapshot<P>) -> bool {
        let mut state = self.inner.state.lock().await;
        if !state.phase.is_live() {
            return false;
        }
        self.merge_remote_into(&mut state, snapshot)
    }

    fn merge_remote_into(&self, state: &mut EngineState<P>, snapshot: RemoteSnapshot<P>) -> bool {
        let RemoteSnapshot::Loaded(remote) = snapshot else {
            event!(Level::TRACE, "remote collection still loading");
            return false;
        };
        if state.last_remote.as_ref() == Some(&remote) {
            return false;
        }

        let scope = state.phase.scope();
        let suppressed = state.suppressed_keys(&scope);
        let in_flight: HashSet<String> = state.in_flight.keys().cloned().collect();
        let merged = merge_remote_snapshot(&state.visible, &remote, &suppressed, &in_flight);
        state.last_remote = Some(remote);

        if merged == state.visible {
            return false;
        }
        state.visible = merged;
        self.inner.commit(state);
        event!(Level::DEBUG, visible = state.visible.len(), "remote push applied");
        true
    }

    async fn start_subscription(&self) {
        let Some((user_id, epoch)) = self.inner.state.lock().await.live_session() else {
            return;
        };

        match self.inner.remote.subscribe(&user_id).await {
            Ok(receiver) => {
                let mut state = self.inner.state.lock().await;
                if !state.is_current(epoch) {
                    return;
                }
                if let Some(previous) = state.subscription.take() {
                    previous.abort();
                }
                state.subscription = Some(Self::spawn_subscription_pump(
                    self.downgrade(),
                    epoch,
                    receiver,
                ));
            }
            Err(err) => {
                event!(Level::WARN, error = %err, "live subscription failed; serving cached data");
                self.inner.notify(
                    Notice::failure("Couldn't connect; showing saved data", err.kind())
                        .with_action(NoticeAction::Retry(RetryTarget::PendingSync)),
                );
            }
        }
    }

    /// Forwards every push of `receiver` into the engine until the session changes, the
    /// feed closes or the engine is dropped.
    fn spawn_subscription_pump(
        engine: Weak<EngineInner<P>>,
        epoch: u64,
        mut receiver: RemoteSubscription<P>,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            loop {
                let snapshot = receiver.borrow_and_update().clone();
                let Some(inner) = engine.upgrade() else {
                    break;
                };
                let engine_ref = SyncEngine::from_inner(inner);
                {
                    let mut state = engine_ref.inner.state.lock().await;
                    if !state.is_current(epoch) {
                        break;
                    }
                    engine_ref.merge_remote_into(&mut state, snapshot);
                }
                drop(engine_ref);

                if receiver.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}
