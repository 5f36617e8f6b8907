use async_trait::async_trait;
use cqrs_application::command::Command;
use cqrs_application::context::HandlerContext;
use cqrs_application::handler::{CommandHandler, EventStreamHandler};
use cqrs_application::handler_record::InMemoryHandlerRecordStore;
use cqrs_application::{Dispatcher, ProcessingPipeline};
use cqrs_domain::aggregate::Aggregate;
use cqrs_domain::domain_event::EventBatch;
use cqrs_domain::error::DomainError;
use cqrs_domain::messaging::{EventPublisher, InMemoryMessageBus, Message, MessageBus};
use cqrs_domain::persist::{
    InMemoryEventStorage, InMemorySnapshotStore, Repository, RepositoryConfig, SnapshotPolicy,
};
use cqrs_domain::retry::RetryConfig;
use cqrs_macros::{domain_event, entity};
use futures_util::{StreamExt, future};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

#[entity]
struct Wallet {
    balance: i64,
}

#[derive(Debug)]
enum WalletCommand {
    TopUp(i64),
}

#[domain_event]
enum WalletEvent {
    ToppedUp { amount: i64 },
}

impl Aggregate for Wallet {
    const TYPE: &'static str = "Wallet";
    const NAMESPACE: &'static str = "pay";

    type Command = WalletCommand;
    type Event = WalletEvent;
    type Error = DomainError;

    fn execute(&self, command: Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            WalletCommand::TopUp(amount) if amount <= 0 => Err(DomainError::InvalidCommand {
                reason: format!("top-up amount must be positive, got {amount}"),
            }),
            WalletCommand::TopUp(amount) => Ok(vec![WalletEvent::ToppedUp { amount }]),
        }
    }

    fn apply(&mut self, event: &Self::Event) {
        match event {
            WalletEvent::ToppedUp { amount } => self.balance += amount,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct TopUp {
    wallet_id: String,
    amount: i64,
}

impl Command for TopUp {
    const NAME: &'static str = "pay.TopUp";
}

struct TopUpHandler {
    repo: Arc<Repository>,
}

#[async_trait]
impl CommandHandler<TopUp> for TopUpHandler {
    async fn handle(&self, ctx: &HandlerContext, cmd: TopUp) -> anyhow::Result<()> {
        let mut wallet = self.repo.find::<Wallet>(&cmd.wallet_id).await?;
        wallet.execute(WalletCommand::TopUp(cmd.amount))?;
        self.repo.save(&mut wallet, &ctx.correlation_id).await?;
        Ok(())
    }
}

struct Ledger;

#[async_trait]
impl EventStreamHandler<Wallet> for Ledger {
    async fn handle(
        &self,
        _ctx: &HandlerContext,
        batch: &EventBatch,
        events: Vec<WalletEvent>,
    ) -> anyhow::Result<()> {
        println!("ledger: {} {} {:?}", batch.key(), batch.version(), events);
        Ok(())
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let bus = Arc::new(InMemoryMessageBus::default());
    let repo = Arc::new(
        Repository::builder()
            .event_storage(Arc::new(InMemoryEventStorage::default()))
            .snapshot_store(Arc::new(InMemorySnapshotStore::default()))
            .publisher(EventPublisher::new(bus.clone(), RetryConfig::default()))
            .config(RepositoryConfig {
                snapshot_policy: SnapshotPolicy::Every(2),
                ..Default::default()
            })
            .build(),
    );

    let dispatcher = Arc::new(
        Dispatcher::builder()
            .records(Arc::new(InMemoryHandlerRecordStore::default()))
            .build(),
    );
    dispatcher.register_command::<TopUp, _>("top-up", TopUpHandler { repo: repo.clone() })?;
    dispatcher.register_event_stream::<Wallet, _>("ledger", Ledger)?;

    let pipeline = ProcessingPipeline::builder()
        .dispatcher(dispatcher)
        .publisher(EventPublisher::new(bus.clone(), RetryConfig::default()))
        .build();
    pipeline.start();

    let mut results = bus.subscribe().await;
    // 命令结果留给调用方，不回流到流水线
    let feed = bus
        .subscribe()
        .await
        .filter(|m| future::ready(!matches!(m, Ok(Message::Result(_)))))
        .boxed();
    pipeline.attach("bus", feed);

    for amount in [50, -5, 20] {
        let cmd = TopUp {
            wallet_id: "w-1".into(),
            amount,
        };
        pipeline.submit(cmd.to_message()?.into()).await?;
    }

    let mut received = 0;
    while received < 3 {
        match results.next().await {
            Some(Ok(Message::Result(result))) => {
                received += 1;
                match result.error() {
                    None => println!("command {} succeeded", result.command_id()),
                    Some(reason) => println!("command {} failed: {reason}", result.command_id()),
                }
            }
            Some(_) => {}
            None => break,
        }
    }

    pipeline.shutdown().await;
    repo.flush().await;

    let wallet = repo.find::<Wallet>(&"w-1".to_string()).await?;
    println!(
        "wallet {} balance={} version={}",
        wallet.id(),
        wallet.state().balance,
        wallet.version()
    );
    Ok(())
}
