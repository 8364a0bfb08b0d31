use std::sync::Arc;

use injected::{
    depends, provider, resolver, Args, Completion, DynError, Provider, Scoped, Seed,
};

#[derive(Debug)]
struct Config {
    url: String,
}

#[derive(Debug)]
struct Connection {
    url: String,
}

fn main() {
    let config: Provider<Config> = provider("config").build_seeded();
    let connection = provider("connection")
        .depends("config", depends(&config))
        .build_resource(|args| {
            let config = args.get::<Config>("config")?;
            println!("Connecting to {}", config.url);
            Ok(Scoped::new(
                Connection {
                    url: config.url.clone(),
                },
                |completion: Completion| println!("Disconnected [{completion:?}]"),
            ))
        });
    let user = provider("user")
        .param("id")
        .depends("connection", depends(&connection))
        .build_async(|args| async move {
            let connection = args.get::<Connection>("connection")?;
            let id = args.value::<u32>("id")?;
            Ok::<_, DynError>(format!("user {id} from {}", connection.url))
        });

    let seed = Seed::new().with(
        &config,
        Config {
            url: "postgres://localhost".to_string(),
        },
    );
    let user = resolver(&user).with_seed(seed);

    let result: Result<Arc<String>, _> = user.call(Args::new().arg(7_u32));
    println!("{result:?}");
    match user.graph(Args::new().arg(7_u32)) {
        Ok(graph) => println!("{}", graph.to_dot()),
        Err(error) => println!("{error}"),
    }
}
