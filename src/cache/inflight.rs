use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::convert::Infallible;
use std::fmt::Display;
use std::future::Future;
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use tokio::sync::oneshot;
use tracing::debug;

use crate::tasks::BackgroundTasks;

type SharedOutput<T> = Shared<BoxFuture<'static, Option<T>>>;
type Settled = Shared<BoxFuture<'static, ()>>;

struct Flight<T> {
    id: u64,
    output: SharedOutput<T>,
    settled: Settled,
}

/// Canal con el que la operación líder publica su resultado.
///
/// Publicar no termina la operación: puede seguir trabajando (por ejemplo,
/// guardando en caché) y la clave sigue "en vuelo" hasta que acabe.
pub struct Publisher<T> {
    tx: oneshot::Sender<T>,
}

impl<T> Publisher<T> {
    pub fn publish(self, value: T) {
        let _ = self.tx.send(value);
    }
}

/// Resultado de unirse a una clave: el mismo handle para todos los llamadores.
pub struct Joined<T> {
    pub output: SharedOutput<T>,
    pub settled: Settled,
    pub leader: bool,
}

impl<T: Clone> Joined<T> {
    /// Valor publicado; `None` si la operación terminó sin publicar.
    pub async fn result(&self) -> Option<T> {
        self.output.clone().await
    }

    /// Espera a que la operación termine por completo.
    pub async fn wait_settled(&self) {
        self.settled.clone().await
    }
}

/// Retira la entrada al terminar la tarea, incluso si la operación hace panic.
struct FlightGuard<T> {
    table: Arc<InFlight<T>>,
    key: String,
    id: u64,
}

impl<T> Drop for FlightGuard<T> {
    fn drop(&mut self) {
        self.table.finish(&self.key, self.id);
    }
}

/// Tabla de operaciones en vuelo por clave normalizada.
///
/// Es el único punto de exclusión mutua explícito: decide quién es el primer
/// llamador para una clave. Los demás reciben el mismo handle compartido.
pub struct InFlight<T> {
    flights: Mutex<HashMap<String, Flight<T>>>,
    next_id: AtomicU64,
    tasks: BackgroundTasks,
}

impl<T> InFlight<T> {
    fn finish(&self, key: &str, id: u64) {
        let mut flights = self.flights.lock();
        if flights.get(key).map_or(false, |flight| flight.id == id) {
            flights.remove(key);
            debug!("🏁 Operación en vuelo terminada: {}", key);
        }
    }

    pub fn contains(&self, key: &str) -> bool {
        self.flights.lock().contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.flights.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<T> InFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(tasks: BackgroundTasks) -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
            tasks,
        }
    }

    /// Handle de la operación en vuelo para `key`, si existe.
    pub fn join_existing(&self, key: &str) -> Option<Joined<T>> {
        self.flights.lock().get(key).map(|flight| Joined {
            output: flight.output.clone(),
            settled: flight.settled.clone(),
            leader: false,
        })
    }

    /// Se une a la operación en vuelo para `key` o la inicia con `start`.
    ///
    /// La operación corre en una tarea propia: sigue hasta el final aunque
    /// ningún llamador la espere, y la entrada se retira al terminar, con
    /// éxito o con fallo. Un error de la operación solo se registra.
    /// `start` no debe volver a llamar a esta tabla.
    pub fn coalesce<F, Fut, E>(self: &Arc<Self>, key: &str, start: F) -> Joined<T>
    where
        F: FnOnce(Publisher<T>) -> Fut,
        Fut: Future<Output = Result<(), E>> + Send + 'static,
        E: Display + Send + 'static,
    {
        let mut flights = self.flights.lock();
        if let Some(flight) = flights.get(key) {
            debug!("🔗 Uniéndose a operación en vuelo: {}", key);
            return Joined {
                output: flight.output.clone(),
                settled: flight.settled.clone(),
                leader: false,
            };
        }

        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();
        let output: SharedOutput<T> = rx.map(Result::ok).boxed().shared();

        let guard = FlightGuard {
            table: Arc::clone(self),
            key: key.to_string(),
            id,
        };
        let operation = start(Publisher { tx });
        let handle = self.tasks.spawn("in-flight", key, async move {
            let _guard = guard;
            operation.await
        });
        let settled: Settled = handle.map(|_| ()).boxed().shared();

        flights.insert(
            key.to_string(),
            Flight {
                id,
                output: output.clone(),
                settled: settled.clone(),
            },
        );
        debug!("🚀 Nueva operación en vuelo: {}", key);

        Joined {
            output,
            settled,
            leader: true,
        }
    }

    /// Forma simple: ejecuta `operation` una sola vez por clave y comparte su resultado.
    pub async fn run<F, Fut>(self: &Arc<Self>, key: &str, operation: F) -> Option<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T> + Send + 'static,
    {
        let joined = self.coalesce(key, |publisher| {
            let fut = operation();
            async move {
                publisher.publish(fut.await);
                Ok::<(), Infallible>(())
            }
        });
        joined.result().await
    }
}
