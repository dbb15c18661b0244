pub mod analysis;
pub mod core;
pub mod crawler;
pub mod index;
pub mod ranking;
pub mod retrieval;
pub mod server;
pub mod storage;

/*
Data flow through the engine:

    crawler ──fetch──> analysis::html ──tokens──> index::indexer
       │                                              │
       │ (deferred parent edges at each depth barrier)│
       └──────────────────────────────────────────────┤
                                                      v
                                        storage (7 typed tables)
                                                      │
                              ranking::pagerank (post-ingestion)
                                                      │
                                                      v
    server::http ──query──> retrieval::pipeline ──reads──> storage
                └──prefix──> retrieval::wordlist

Ingestion and retrieval never run concurrently: the crawler binary writes,
the server binary reads the finished snapshot.
*/
