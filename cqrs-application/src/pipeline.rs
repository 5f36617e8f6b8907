//! 处理流水线（ProcessingPipeline）
//!
//! 每个 `(消息种类, 类型码)` 各有一个有界信封队列与一组 Worker，队列在首次提交时创建，
//! 某个类型积压不会占用其他类型的容量。
//! `submit` 入队（满时阻塞），Worker 取出后交给调度器执行，记录处理耗时，
//! 命令执行完毕后在总线上发布对应的 `CommandResult`，最后 `complete` 信封。
//! `attach` 增加一个把总线订阅流转入队列的 Worker。
//!
use crate::dispatcher::Dispatcher;
use cqrs_domain::error::DomainResult as Result;
use cqrs_domain::messaging::{
    CommandResult, Envelope, EnvelopeQueue, EnvelopeQueues, EventPublisher, Message, MessageKind,
    Worker, WorkerDefinition, WorkerPool,
};
use futures_core::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::{Duration, Instant};

/// 流水线配置
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// 每个消息类型的队列容量
    pub queue_capacity: usize,
    /// 每个消息类型的 Worker 数
    pub workers_per_type: usize,
    /// Worker 两次迭代之间的休眠
    pub worker_interval: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: 1024,
            workers_per_type: 4,
            worker_interval: Duration::ZERO,
        }
    }
}

type Queue = Arc<EnvelopeQueue<Message>>;
type Feed = Arc<tokio::sync::Mutex<BoxStream<'static, Result<Message>>>>;

/// 队列名：种类与类型码
fn queue_key(kind: MessageKind, message_type: &str) -> String {
    format!("{kind}:{message_type}")
}

#[derive(Default)]
struct Pools {
    started: bool,
    closed: bool,
    pools: Vec<WorkerPool<Envelope<Message>>>,
}

struct Shared {
    queues: EnvelopeQueues<Message>,
    pools: Mutex<Pools>,
    dispatcher: Arc<Dispatcher>,
    publisher: EventPublisher,
    config: PipelineConfig,
}

impl Shared {
    fn queue_for(&self, key: &str) -> Queue {
        let (queue, created) = self.queues.get_or_create(key);
        if created {
            self.spawn_pool(key, &queue);
        }
        queue
    }

    fn spawn_pool(&self, key: &str, queue: &Queue) {
        let definition = definition(queue.clone(), self.dispatcher.clone(), self.publisher.clone())
            .interval(self.config.worker_interval);
        let pool = WorkerPool::new(
            format!("pipeline-{key}"),
            self.config.workers_per_type,
            definition,
        );

        let mut pools = self.pools.lock().unwrap_or_else(PoisonError::into_inner);
        if pools.closed {
            queue.close();
            return;
        }
        if pools.started {
            pool.start();
        }
        pools.pools.push(pool);
    }

    async fn enqueue(&self, message: Message) -> Result<()> {
        let queue = self.queue_for(&queue_key(message.kind(), &message.message_type()));
        let correlation_id = message.correlation_id().to_string();
        queue.enqueue(Envelope::new(message, correlation_id)).await
    }
}

fn definition(
    queue: Queue,
    dispatcher: Arc<Dispatcher>,
    publisher: EventPublisher,
) -> WorkerDefinition<Envelope<Message>> {
    let supply = {
        let queue = queue.clone();
        move || {
            let queue = queue.clone();
            async move { queue.dequeue().await.ok() }
        }
    };

    let handle = move |envelope: Envelope<Message>| {
        let queue = queue.clone();
        let dispatcher = dispatcher.clone();
        let publisher = publisher.clone();
        async move { process(&queue, &dispatcher, &publisher, envelope).await }
    };

    WorkerDefinition::from_supplier(supply, handle)
}

/// 离开作用域时完成信封，panic 与提前返回都会归还容量
struct CompleteOnDrop<'a> {
    queue: &'a EnvelopeQueue<Message>,
    envelope: Envelope<Message>,
}

impl Drop for CompleteOnDrop<'_> {
    fn drop(&mut self) {
        self.queue.complete(&self.envelope);
    }
}

async fn process(
    queue: &EnvelopeQueue<Message>,
    dispatcher: &Dispatcher,
    publisher: &EventPublisher,
    envelope: Envelope<Message>,
) -> anyhow::Result<()> {
    let mut slot = CompleteOnDrop { queue, envelope };

    let started = Instant::now();
    let execution = dispatcher.execute(slot.envelope.body()).await;
    slot.envelope.set_processing_time(started.elapsed());

    if let Message::Command(command) = slot.envelope.body() {
        let result = match &execution.outcome {
            Ok(_) => CommandResult::succeeded(command),
            Err(err) => CommandResult::failed(command, err),
        };
        publisher.publish(&Message::Result(result)).await?;
    }

    execution.outcome.map(|_| ()).map_err(anyhow::Error::from)
}

pub struct ProcessingPipeline {
    shared: Arc<Shared>,
    feeders: Mutex<Vec<Worker<Result<Message>>>>,
}

#[bon::bon]
impl ProcessingPipeline {
    #[builder]
    pub fn new(
        dispatcher: Arc<Dispatcher>,
        publisher: EventPublisher,
        #[builder(default)] config: PipelineConfig,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                queues: EnvelopeQueues::new(config.queue_capacity),
                pools: Mutex::new(Pools::default()),
                dispatcher,
                publisher,
                config,
            }),
            feeders: Mutex::new(Vec::new()),
        }
    }
}

impl ProcessingPipeline {
    pub fn config(&self) -> &PipelineConfig {
        &self.shared.config
    }

    pub fn queues(&self) -> &EnvelopeQueues<Message> {
        &self.shared.queues
    }

    /// 某个消息类型的队列；尚未提交过该类型时为 `None`
    pub fn queue(&self, kind: MessageKind, message_type: &str) -> Option<Queue> {
        self.shared.queues.get(&queue_key(kind, message_type))
    }

    /// 启动已有队列的 Worker；之后新建的队列会立即启动
    pub fn start(&self) {
        let mut pools = self
            .shared
            .pools
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        pools.started = true;
        pools.pools.iter().for_each(WorkerPool::start);
    }

    /// 提交一条消息；该类型的队列已满时等待
    pub async fn submit(&self, message: Message) -> Result<()> {
        self.shared.enqueue(message).await
    }

    /// 消费外部消息流，流结束时对应 Worker 随之结束
    pub fn attach(&self, name: impl Into<String>, stream: BoxStream<'static, Result<Message>>) {
        let feed: Feed = Arc::new(tokio::sync::Mutex::new(stream));
        let shared = self.shared.clone();

        let definition = WorkerDefinition::from_supplier(
            move || {
                let feed = feed.clone();
                async move {
                    let mut stream = feed.lock().await;
                    stream.next().await
                }
            },
            move |item: Result<Message>| {
                let shared = shared.clone();
                async move {
                    let message = item?;
                    shared.enqueue(message).await?;
                    Ok(())
                }
            },
        );

        let worker = Worker::new(name, definition);
        worker.start();
        self.feeders
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(worker);
    }

    /// 等待所有已入队的消息处理完毕
    pub async fn drain(&self) {
        for queue in self.shared.queues.all() {
            loop {
                let mut completions = queue.subscribe_completions();
                if queue.outstanding() == 0 {
                    break;
                }
                let _ = completions.recv().await;
            }
        }
    }

    /// 停止消费外部流，处理完已入队的消息后关闭队列并停止 Worker
    pub async fn shutdown(&self) {
        let feeders = std::mem::take(
            &mut *self
                .feeders
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );
        for feeder in &feeders {
            feeder.shutdown().await;
        }

        self.drain().await;

        let pools = {
            let mut pools = self
                .shared
                .pools
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            pools.closed = true;
            std::mem::take(&mut pools.pools)
        };
        self.shared.queues.close_all();
        for pool in &pools {
            pool.shutdown().await;
        }
        tracing::info!(queues = self.shared.queues.len(), "processing pipeline stopped");
    }
}
