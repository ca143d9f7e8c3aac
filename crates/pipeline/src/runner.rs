//! Producer / consumer pipeline
//!
//! A producer thread reads samples from a [`SampleSource`] and pushes them
//! into the lock-free queue without ever blocking. The calling thread is the
//! consumer: it polls the queue, smooths temperature and pressure with two
//! independent moving averages and hands each reading to an optional
//! [`TelemetrySink`]. Publish failures are counted and logged, never fatal.

use crate::config::{Settings, MAX_AVG_WINDOW, RING_CAPACITY};
use crate::error::PipelineError;
use metrics::counter;
use ring_buffer::{BoundedQueue, Consumer, Producer};
use signal_filter::MovingAverage;
use sim_sensor::{SampleSource, SensorSample};
use std::thread;
use std::time::{Duration, Instant};
use telemetry_publisher::{DeliveryQos, ReadingPayload, TelemetrySink};
use tracing::{debug, info, warn};

/// Queue carrying samples from the producer to the consumer
pub type SampleQueue = BoundedQueue<SensorSample, RING_CAPACITY>;

/// Moving average used for both channels
pub type Smoother = MovingAverage<MAX_AVG_WINDOW>;

/// What the producer did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    /// Samples read from the source
    pub produced: usize,
    /// Samples refused by a full queue
    pub dropped: usize,
}

/// What the consumer did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DrainReport {
    /// Samples taken off the queue
    pub consumed: usize,
    /// Readings the sink accepted
    pub published: usize,
    /// Readings the sink rejected
    pub publish_failures: usize,
    /// The consumer stopped on its deadline instead of the sample count
    pub deadline_hit: bool,
    /// Most recent reading
    pub last: Option<ReadingPayload>,
}

/// Summary of a full run
#[derive(Debug, Clone, PartialEq)]
pub struct PipelineReport {
    pub producer: ProducerReport,
    pub drain: DrainReport,
    /// Samples evicted under the overwrite-oldest policy
    pub overwritten: usize,
    pub elapsed: Duration,
}

/// Push `count` samples from `source`, sleeping `period` after each
pub fn produce<S, const N: usize>(
    producer: &mut Producer<'_, SensorSample, N>,
    source: &mut S,
    count: usize,
    period: Duration,
) -> ProducerReport
where
    S: SampleSource + ?Sized,
{
    let mut report = ProducerReport::default();

    for _ in 0..count {
        let sample = source.produce();
        report.produced += 1;
        counter!("telemetry_samples_produced_total").increment(1);

        if producer.try_push(sample).is_err() {
            report.dropped += 1;
            counter!("telemetry_samples_dropped_total").increment(1);
            debug!("Queue full, dropped sample {}", report.produced);
        }

        if !period.is_zero() {
            thread::sleep(period);
        }
    }

    info!(
        produced = report.produced,
        dropped = report.dropped,
        "Producer finished"
    );
    report
}

/// Where and how readings are published
pub struct PublishTarget<'a> {
    pub sink: &'a mut dyn TelemetrySink,
    pub topic: &'a str,
    pub qos: DeliveryQos,
    pub retain: bool,
}

/// Consumer side: pop, smooth, publish
pub struct Drain<'a> {
    temperature: Smoother,
    pressure: Smoother,
    target: Option<PublishTarget<'a>>,
    backoff: Duration,
}

impl<'a> Drain<'a> {
    /// Create a consumer with both filters set to `window`
    pub fn new(window: usize, backoff: Duration, target: Option<PublishTarget<'a>>) -> Self {
        Self {
            temperature: Smoother::with_window(window),
            pressure: Smoother::with_window(window),
            target,
            backoff,
        }
    }

    /// Turn one sample into a reading, updating both filters
    pub fn process(&mut self, sample: &SensorSample) -> ReadingPayload {
        ReadingPayload {
            temperature_c: sample.temperature_c,
            avg_temperature_c: self.temperature.push(sample.temperature_c),
            pressure_kpa: sample.pressure_kpa,
            avg_pressure_kpa: self.pressure.push(sample.pressure_kpa),
        }
    }

    /// Consume until `expected` samples were seen or `deadline` passes
    pub fn run<const N: usize>(
        &mut self,
        consumer: &mut Consumer<'_, SensorSample, N>,
        expected: usize,
        deadline: Instant,
    ) -> DrainReport {
        let mut report = DrainReport::default();

        while report.consumed < expected {
            let Some(sample) = consumer.try_pop() else {
                if Instant::now() >= deadline {
                    warn!(
                        "Consumer deadline reached after {} of {} samples",
                        report.consumed, expected
                    );
                    report.deadline_hit = true;
                    break;
                }
                thread::sleep(self.backoff);
                continue;
            };

            report.consumed += 1;
            counter!("telemetry_samples_consumed_total").increment(1);

            let payload = self.process(&sample);
            debug!(
                "T={:.3} C (avg {:.3})  P={:.3} kPa (avg {:.3})",
                payload.temperature_c,
                payload.avg_temperature_c,
                payload.pressure_kpa,
                payload.avg_pressure_kpa
            );

            if let Some(target) = self.target.as_mut() {
                match target
                    .sink
                    .publish(target.topic, &payload.to_bytes(), target.qos, target.retain)
                {
                    Ok(()) => report.published += 1,
                    Err(e) => {
                        report.publish_failures += 1;
                        counter!("telemetry_publish_failures_total").increment(1);
                        // One warning per run, the rest would flood the log
                        if report.publish_failures == 1 {
                            warn!("Publish failed: {}", e);
                        } else {
                            debug!("Publish failed: {}", e);
                        }
                    }
                }
            }

            report.last = Some(payload);
        }

        info!(
            consumed = report.consumed,
            published = report.published,
            publish_failures = report.publish_failures,
            "Consumer finished"
        );
        report
    }
}

/// A configured pipeline, ready to run
#[derive(Debug, Clone)]
pub struct Pipeline {
    settings: Settings,
}

impl Pipeline {
    /// Create a pipeline; out-of-range settings are clamped
    pub fn new(settings: Settings) -> Self {
        Self {
            settings: settings.clamped(),
        }
    }

    /// Get the effective settings
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run one producer / consumer session to completion
    ///
    /// The producer runs on its own thread, the caller's thread consumes.
    /// Without a sink readings are only smoothed and logged.
    pub fn run<S>(
        &self,
        mut source: S,
        sink: Option<&mut dyn TelemetrySink>,
    ) -> Result<PipelineReport, PipelineError>
    where
        S: SampleSource + Send,
    {
        let settings = &self.settings;
        let mut queue = SampleQueue::new(settings.queue_policy.into());
        let started = Instant::now();
        let deadline = started + settings.drain_budget();

        let target = sink.map(|sink| PublishTarget {
            sink,
            topic: settings.publisher.topic.as_str(),
            qos: DeliveryQos::from_level(settings.publisher.qos),
            retain: settings.publisher.retain,
        });
        let mut drain = Drain::new(settings.window, settings.poll_backoff(), target);

        info!(
            "Pipeline starting: {} samples every {:?}, window {}, policy {:?}",
            settings.samples,
            settings.sample_period(),
            settings.window,
            settings.queue_policy
        );

        let (producer, drained) = {
            let (mut producer, mut consumer) = queue.split();
            let samples = settings.samples;
            let period = settings.sample_period();

            thread::scope(|s| -> Result<_, PipelineError> {
                let worker = thread::Builder::new()
                    .name("sensor-producer".to_string())
                    .spawn_scoped(s, move || produce(&mut producer, &mut source, samples, period))?;

                let drained = drain.run(&mut consumer, samples, deadline);
                let producer = worker
                    .join()
                    .map_err(|_| PipelineError::ThreadPanicked("producer"))?;
                Ok((producer, drained))
            })?
        };

        let report = PipelineReport {
            producer,
            drain: drained,
            overwritten: queue.overwritten(),
            elapsed: started.elapsed(),
        };
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueuePolicy;
    use proptest::prelude::*;
    use ring_buffer::OverflowPolicy;
    use metrics::{
        Counter, Gauge, Histogram, Key, KeyName, Metadata, Recorder, SharedString, Unit,
    };
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};
    use telemetry_publisher::PublishError;

    /// Sink that records what it was given
    #[derive(Default)]
    struct RecordingSink {
        published: Vec<(String, String, DeliveryQos, bool)>,
        fail: bool,
    }

    impl TelemetrySink for RecordingSink {
        fn connect(&mut self, _: &str, _: &str, _: Duration) -> Result<(), PublishError> {
            Ok(())
        }

        fn publish(
            &mut self,
            topic: &str,
            payload: &[u8],
            qos: DeliveryQos,
            retain: bool,
        ) -> Result<(), PublishError> {
            if self.fail {
                return Err(PublishError::NotConnected);
            }
            self.published.push((
                topic.to_string(),
                String::from_utf8_lossy(payload).into_owned(),
                qos,
                retain,
            ));
            Ok(())
        }

        fn disconnect(&mut self) {}

        fn is_connected(&self) -> bool {
            !self.fail
        }
    }

    /// Temperatures 0, 1, 2, ... and pressures 1000, 1001, ...
    fn counting_source() -> impl FnMut() -> SensorSample + Send {
        let mut i = 0u32;
        move || {
            let sample = SensorSample::now(i as f32, 1000.0 + i as f32);
            i += 1;
            sample
        }
    }

    fn fast_settings(samples: usize, window: usize) -> Settings {
        Settings {
            samples,
            window,
            sample_period_ms: 0,
            poll_backoff_ms: 1,
            drain_grace_ms: 5000,
            ..Default::default()
        }
    }

    #[test]
    fn test_pipeline_publishes_every_sample() {
        let mut settings = fast_settings(100, 4);
        settings.publisher.topic = "test/readings".to_string();
        settings.publisher.qos = 1;
        let pipeline = Pipeline::new(settings);

        let mut sink = RecordingSink::default();
        let report = pipeline.run(counting_source(), Some(&mut sink)).unwrap();

        assert_eq!(report.producer, ProducerReport { produced: 100, dropped: 0 });
        assert_eq!(report.drain.consumed, 100);
        assert_eq!(report.drain.published, 100);
        assert_eq!(report.drain.publish_failures, 0);
        assert!(!report.drain.deadline_hit);
        assert_eq!(report.overwritten, 0);

        assert_eq!(sink.published.len(), 100);
        let (topic, first, qos, retain) = &sink.published[0];
        assert_eq!(topic, "test/readings");
        assert_eq!(first, "0.000,0.000,1000.000,1000.000");
        assert_eq!(*qos, DeliveryQos::AtLeastOnce);
        assert!(!retain);

        // Last window is 96..=99
        let (_, last, _, _) = &sink.published[99];
        assert_eq!(last, "99.000,97.500,1099.000,1097.500");
        let last: ReadingPayload = last.parse().unwrap();
        assert_eq!(report.drain.last, Some(last));
    }

    #[test]
    fn test_pipeline_without_sink() {
        let pipeline = Pipeline::new(fast_settings(50, 10));
        let report = pipeline.run(counting_source(), None).unwrap();

        assert_eq!(report.drain.consumed, 50);
        assert_eq!(report.drain.published, 0);
        assert_eq!(report.drain.publish_failures, 0);
        let last = report.drain.last.unwrap();
        assert_eq!(last.temperature_c, 49.0);
        assert_eq!(last.avg_temperature_c, 44.5);
    }

    #[test]
    fn test_publish_failures_are_not_fatal() {
        let pipeline = Pipeline::new(fast_settings(50, 5));
        let mut sink = RecordingSink {
            fail: true,
            ..Default::default()
        };

        let report = pipeline.run(counting_source(), Some(&mut sink)).unwrap();
        assert_eq!(report.drain.consumed, 50);
        assert_eq!(report.drain.published, 0);
        assert_eq!(report.drain.publish_failures, 50);
        assert!(report.drain.last.is_some());
    }

    #[test]
    fn test_pipeline_clamps_settings() {
        let pipeline = Pipeline::new(Settings {
            window: 0,
            samples: 0,
            ..Default::default()
        });
        assert_eq!(pipeline.settings().window, 1);
        assert_eq!(pipeline.settings().samples, 1);
    }

    #[test]
    fn test_overwrite_policy_pipeline_completes() {
        let mut settings = fast_settings(300, 8);
        settings.queue_policy = QueuePolicy::OverwriteOldest;
        settings.drain_grace_ms = 200;
        let pipeline = Pipeline::new(settings);

        let report = pipeline.run(counting_source(), None).unwrap();
        assert_eq!(report.producer.produced, 300);
        assert_eq!(report.producer.dropped, 0);
        // Evicted samples never reach the consumer
        assert_eq!(report.drain.consumed + report.overwritten, 300);
    }

    #[test]
    fn test_producer_drops_when_full() {
        let mut queue: BoundedQueue<SensorSample, 16> = BoundedQueue::new(OverflowPolicy::Reject);
        let (mut producer, _consumer) = queue.split();
        let mut source = counting_source();

        let report = produce(&mut producer, &mut source, 20, Duration::ZERO);
        assert_eq!(report, ProducerReport { produced: 20, dropped: 4 });
        assert!(producer.is_full());
    }

    #[test]
    fn test_producer_overwrites_when_full() {
        let mut queue: BoundedQueue<SensorSample, 16> =
            BoundedQueue::new(OverflowPolicy::OverwriteOldest);
        {
            let (mut producer, _consumer) = queue.split();
            let mut source = counting_source();
            let report = produce(&mut producer, &mut source, 20, Duration::ZERO);
            assert_eq!(report.dropped, 0);
        }
        assert_eq!(queue.overwritten(), 4);
        assert_eq!(queue.try_pop().map(|s| s.temperature_c), Some(4.0));
    }

    #[test]
    fn test_drain_stops_at_deadline() {
        let mut queue: BoundedQueue<SensorSample, 16> = BoundedQueue::new(OverflowPolicy::Reject);
        let (_producer, mut consumer) = queue.split();
        let mut drain = Drain::new(4, Duration::from_millis(1), None);

        let started = Instant::now();
        let report = drain.run(&mut consumer, 10, started + Duration::from_millis(30));

        assert!(report.deadline_hit);
        assert_eq!(report.consumed, 0);
        assert!(report.last.is_none());
        assert!(started.elapsed() >= Duration::from_millis(30));
    }

    #[test]
    fn test_drain_filters_are_independent() {
        let mut drain = Drain::new(2, Duration::ZERO, None);
        let a = drain.process(&SensorSample::now(10.0, 100.0));
        let b = drain.process(&SensorSample::now(20.0, 300.0));
        assert_eq!(a.avg_temperature_c, 10.0);
        assert_eq!(b.avg_temperature_c, 15.0);
        assert_eq!(b.avg_pressure_kpa, 200.0);
    }

    /// Recorder that keeps plain counter totals by name
    #[derive(Default)]
    struct CountingRecorder {
        counters: Mutex<HashMap<String, Arc<AtomicU64>>>,
    }

    impl CountingRecorder {
        fn total(&self, name: &str) -> u64 {
            self.counters
                .lock()
                .unwrap()
                .get(name)
                .map_or(0, |c| c.load(Ordering::Relaxed))
        }
    }

    impl Recorder for CountingRecorder {
        fn describe_counter(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_gauge(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}
        fn describe_histogram(&self, _: KeyName, _: Option<Unit>, _: SharedString) {}

        fn register_counter(&self, key: &Key, _: &Metadata<'_>) -> Counter {
            let mut counters = self.counters.lock().unwrap();
            let counter = counters.entry(key.name().to_string()).or_default();
            Counter::from_arc(Arc::clone(counter))
        }

        fn register_gauge(&self, _: &Key, _: &Metadata<'_>) -> Gauge {
            Gauge::noop()
        }

        fn register_histogram(&self, _: &Key, _: &Metadata<'_>) -> Histogram {
            Histogram::noop()
        }
    }

    #[test]
    fn test_counters_track_samples_and_failures() {
        let recorder = CountingRecorder::default();
        let mut queue: BoundedQueue<SensorSample, 16> = BoundedQueue::new(OverflowPolicy::Reject);
        let (mut producer, mut consumer) = queue.split();
        let mut sink = RecordingSink {
            fail: true,
            ..Default::default()
        };

        let (produced, drained) = metrics::with_local_recorder(&recorder, || {
            let mut source = counting_source();
            let produced = produce(&mut producer, &mut source, 20, Duration::ZERO);

            let target = PublishTarget {
                sink: &mut sink,
                topic: "test/readings",
                qos: DeliveryQos::AtMostOnce,
                retain: false,
            };
            let mut drain = Drain::new(4, Duration::ZERO, Some(target));
            let drained = drain.run(&mut consumer, 16, Instant::now() + Duration::from_secs(5));
            (produced, drained)
        });

        assert_eq!(produced, ProducerReport { produced: 20, dropped: 4 });
        assert_eq!(drained.consumed, 16);
        assert_eq!(recorder.total("telemetry_samples_produced_total"), 20);
        assert_eq!(recorder.total("telemetry_samples_dropped_total"), 4);
        assert_eq!(recorder.total("telemetry_samples_consumed_total"), 16);
        assert_eq!(recorder.total("telemetry_publish_failures_total"), 16);
    }

    proptest! {
        #[test]
        fn prop_reading_average_matches_window(
            temps in prop::collection::vec(-50.0f32..500.0, 1..200),
            window in 1usize..32,
        ) {
            let mut drain = Drain::new(window, Duration::ZERO, None);
            let mut last = None;
            for &t in &temps {
                last = Some(drain.process(&SensorSample::now(t, 1400.0)));
            }

            let tail = &temps[temps.len().saturating_sub(window)..];
            let expected = tail.iter().map(|&t| t as f64).sum::<f64>() / tail.len() as f64;
            let last = last.unwrap();
            prop_assert!((last.avg_temperature_c as f64 - expected).abs() < 1e-2);
            prop_assert_eq!(last.avg_pressure_kpa, 1400.0);
        }
    }
}
