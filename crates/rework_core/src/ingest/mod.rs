pub mod service_orders_csv;
