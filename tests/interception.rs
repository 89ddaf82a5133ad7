use pipetap::host::{Host, Identity, OnlineUser, User};
use pipetap::introspect::{Object, Reflect, TypeDescriptor};
use pipetap::pipeline::{
    AcceptorList, Channel, Handler, HandlerContext, HandlerResult, Message, Outcome, Pipeline,
    Promise,
};
use pipetap::{Cancellable, EventKind, ListenerConfig, PacketEvent, PacketListener, Priority};
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use uuid::Uuid;

pipetap::host_type! {
    #[derive(Clone, Default)]
    pub struct ServerConnection("net.minecraft.server.v1_12_R1") {
        running: bool,
        channels: AcceptorList,
        pending: Vec<String>,
    }
}

pipetap::host_type! {
    pub struct PacketLoginInStart("net.minecraft.server.v1_12_R1") {
        profile: Identity,
    }
}

pipetap::host_type! {
    pub struct PacketPlayInChat("net.minecraft.server.v1_12_R1") {
        message: String,
    }
}

pipetap::host_type! {
    pub struct PacketPlayOutChat("net.minecraft.server.v1_12_R1") {
        message: String,
        position: u8,
    }
}

#[derive(Default)]
struct MinecraftServer {
    motd: String,
    connection: RwLock<Option<ServerConnection>>,
}

impl Reflect for MinecraftServer {
    fn describe(&self) -> TypeDescriptor {
        TypeDescriptor::builder::<Self>("net.minecraft.server.v1_12_R1", "MinecraftServer")
            .field::<String>("motd", |s| &s.motd, |s| &mut s.motd)
            .object::<ServerConnection>("p", |s| s.connection.read().unwrap().clone())
            .build()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

#[derive(Debug)]
struct Player {
    id: Uuid,
    name: String,
}

impl OnlineUser for Player {
    fn unique_id(&self) -> Uuid {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }
}

struct FakeServer {
    server: Arc<MinecraftServer>,
    online: HashMap<Uuid, User>,
}

impl Host for FakeServer {
    fn name(&self) -> &str {
        "FakeServer"
    }

    fn core_server(&self) -> Option<Object> {
        Some(Arc::clone(&self.server) as Object)
    }

    fn lookup_online_user(&self, id: Uuid) -> Result<Option<User>, failure::Error> {
        Ok(self.online.get(&id).cloned())
    }
}

type Log = Arc<Mutex<Vec<String>>>;

/// The host's own packet handler at the end of every connection
struct PacketHandler(Log);

impl Handler for PacketHandler {
    fn channel_active(&self, ctx: &HandlerContext) -> HandlerResult {
        ctx.fire_channel_active();
        Ok(())
    }

    fn channel_read(&self, _ctx: &HandlerContext, msg: Message) -> HandlerResult {
        let message = msg
            .as_any()
            .downcast_ref::<PacketPlayInChat>()
            .map(|chat| chat.message.clone())
            .unwrap_or_else(|| msg.describe().name().to_string());
        self.0.lock().unwrap().push(message);
        Ok(())
    }
}

fn transport(sent: &Log) -> Pipeline {
    let sent = Arc::clone(sent);
    Pipeline::new(move |msg: Message, promise: Promise| {
        if let Some(chat) = msg.as_any().downcast_ref::<PacketPlayOutChat>() {
            sent.lock().unwrap().push(chat.message.clone());
        }
        promise.succeed();
    })
}

fn chat_message(event: &PacketEvent) -> Result<String, failure::Error> {
    Ok(event
        .packet()
        .field_of_type_at::<String>(0)?
        .unwrap_or_default())
}

#[test]
fn packets_are_intercepted_and_cancelled() {
    let _ = simple_logger::init();

    let notch = Uuid::from_u128(0x069a_79f4_44e9_4726_a5be_fca9_0e38_aaf5);
    let mut online: HashMap<Uuid, User> = HashMap::new();
    online.insert(
        notch,
        Arc::new(Player {
            id: notch,
            name: "Notch".to_string(),
        }),
    );

    let server = Arc::new(MinecraftServer::default());
    let host = Arc::new(FakeServer {
        server: Arc::clone(&server),
        online,
    });
    let config = ListenerConfig::builder()
        .poll_initial_ms(1u64)
        .poll_max_ms(8u64)
        .abandon_after_ms(Some(5_000u64))
        .build()
        .expect("error building config");
    let listener = PacketListener::new(host, config);

    // observers
    let senders: Log = Arc::default();
    let seen = Arc::clone(&senders);
    listener
        .events()
        .subscribe(EventKind::Inbound, Priority::Monitor, true, move |event: &mut PacketEvent| {
            let sender = event.user().map(|u| u.name().to_string()).unwrap_or_default();
            seen.lock().unwrap().push(sender);
            Ok(())
        });
    listener.events().on_inbound(|event: &mut PacketEvent| {
        if chat_message(event)?.contains("secret") {
            event.set_cancelled(true);
        }
        Ok(())
    });
    listener.events().on_outbound(|event: &mut PacketEvent| {
        if chat_message(event)? == "blocked" {
            event.set_cancelled(true);
        }
        Ok(())
    });

    assert!(listener.init());

    // the host brings up networking
    let sent: Log = Arc::default();
    let connection = ServerConnection::default();
    let acceptor = Channel::new(0, transport(&sent));
    connection.channels.push(acceptor.clone());
    *server.connection.write().unwrap() = Some(connection);

    let hooked = listener.join().expect("watcher was not started");
    assert_eq!(hooked.expect("error watching for acceptors"), 1);
    assert!(acceptor.pipeline().contains("packetlistener_acceptor"));

    // a client connects
    let received: Log = Arc::default();
    let client = Channel::new(1, transport(&sent));
    client
        .pipeline()
        .add_last("packet_handler", PacketHandler(Arc::clone(&received)))
        .expect("error adding packet handler");
    acceptor.pipeline().fire_channel_read(Box::new(client.clone()));
    client.pipeline().fire_channel_active();

    assert_eq!(
        client.pipeline().names(),
        vec!["packetlistener_interceptor", "packet_handler"]
    );

    // inbound traffic
    let pipeline = client.pipeline();
    pipeline.fire_channel_read(Box::new(PacketLoginInStart {
        profile: Identity::new(notch, "Notch"),
    }));
    pipeline.fire_channel_read(Box::new(PacketPlayInChat {
        message: "hello".to_string(),
    }));
    pipeline.fire_channel_read(Box::new(PacketPlayInChat {
        message: "the secret is out".to_string(),
    }));

    assert_eq!(
        *received.lock().unwrap(),
        vec!["PacketLoginInStart", "hello"]
    );
    assert_eq!(*senders.lock().unwrap(), vec!["Notch", "Notch"]);

    // outbound traffic
    let (promise, mut blocked) = Promise::new();
    pipeline.write(
        Box::new(PacketPlayOutChat {
            message: "blocked".to_string(),
            position: 0,
        }),
        promise,
    );
    let (promise, mut delivered) = Promise::new();
    pipeline.write(
        Box::new(PacketPlayOutChat {
            message: "welcome".to_string(),
            position: 0,
        }),
        promise,
    );

    assert_eq!(blocked.poll(), Outcome::Abandoned);
    assert_eq!(delivered.poll(), Outcome::Succeeded);
    assert_eq!(*sent.lock().unwrap(), vec!["welcome"]);
}

#[test]
fn stopped_listeners_never_hook_anything() {
    let host = Arc::new(FakeServer {
        server: Arc::new(MinecraftServer::default()),
        online: HashMap::new(),
    });
    let listener = PacketListener::new(host, ListenerConfig::default());

    assert!(listener.init());
    listener.stop();

    let result = listener.join().expect("watcher was not started");
    assert_eq!(
        result.map_err(|e| e.to_string()),
        Err("the watcher was stopped".to_string())
    );
}
