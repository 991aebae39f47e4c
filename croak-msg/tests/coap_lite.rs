use coap_lite::{CoapOption, MessageClass, MessageType, Packet, RequestType};
use croak_msg::*;

fn sensor_request() -> Message {
  let mut msg = Message::new(Type::Con, Code::GET, Id(7), Token::try_from_slice(&[1, 2]).unwrap());
  msg.set_path("sensors/temp");
  msg.set_accept(ContentFormat::Text);
  msg.set_block2(Block::new(256, 3, false));
  msg
}

#[test]
fn coap_lite_reads_our_bytes() {
  let msg = sensor_request();
  let packet = Packet::from_bytes(&msg.to_bytes().unwrap()).unwrap();

  assert_eq!(packet.header.message_id, 7);
  assert_eq!(packet.get_token(), &[1, 2]);
  assert_eq!(packet.header.code, MessageClass::Request(RequestType::Get));

  let path = packet.get_option(CoapOption::UriPath)
                   .unwrap()
                   .iter()
                   .cloned()
                   .collect::<Vec<_>>();
  assert_eq!(path, vec![b"sensors".to_vec(), b"temp".to_vec()]);
}

#[test]
fn we_read_coap_lite_bytes() {
  let mut packet = Packet::new();
  packet.header.set_type(MessageType::Confirmable);
  packet.header.code = MessageClass::Request(RequestType::Get);
  packet.header.message_id = 7;
  packet.set_token(vec![1, 2]);
  packet.add_option(CoapOption::UriPath, b"sensors".to_vec());
  packet.add_option(CoapOption::UriPath, b"temp".to_vec());
  packet.add_option(CoapOption::Accept, vec![]);
  packet.add_option(CoapOption::Block2, vec![0b0011_0100]);

  let msg = Message::try_from_bytes(packet.to_bytes().unwrap()).unwrap();
  assert_eq!(msg, sensor_request());
}

#[test]
fn byte_identical_with_payload() {
  let mut msg = Message::new(Type::Non, Code::new(2, 5), Id(300), Token::opaque(b"x"));
  msg.set_content_format(ContentFormat::Json);
  msg.set_max_age(60);
  msg.payload = Payload(br#"{"temp": 23.5}"#.to_vec());

  let ours = msg.to_bytes().unwrap();
  let theirs = Packet::from_bytes(&ours).unwrap().to_bytes().unwrap();
  assert_eq!(ours, theirs);
}
